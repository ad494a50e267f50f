//! The prediction aggregate: owned conditions plus the pre-predict and
//! predict phases, and the lifecycle state derived from them.

use crate::domain::bool_expr::ConditionRef;
use crate::domain::condition::{Condition, Status};
use crate::domain::predict::{PrePredict, Predict};
use crate::domain::prediction_type::PredictionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionValue {
    #[default]
    OngoingPrePrediction,
    OngoingPrediction,
    Correct,
    Incorrect,
    Annulled,
}

impl PredictionValue {
    pub const ALL: [PredictionValue; 5] = [
        PredictionValue::OngoingPrePrediction,
        PredictionValue::OngoingPrediction,
        PredictionValue::Correct,
        PredictionValue::Incorrect,
        PredictionValue::Annulled,
    ];

    pub const ONGOING: [PredictionValue; 2] = [
        PredictionValue::OngoingPrePrediction,
        PredictionValue::OngoingPrediction,
    ];

    pub fn is_final(self) -> bool {
        !Self::ONGOING.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PredictionValue::OngoingPrePrediction => "ONGOING_PRE_PREDICTION",
            PredictionValue::OngoingPrediction => "ONGOING_PREDICTION",
            PredictionValue::Correct => "CORRECT",
            PredictionValue::Incorrect => "INCORRECT",
            PredictionValue::Annulled => "ANNULLED",
        }
    }
}

impl fmt::Display for PredictionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == upper)
            .ok_or_else(|| format!("unknown prediction state '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionState {
    pub status: Status,
    pub last_ts: i64,
    pub value: PredictionValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub reporter: String,
    #[serde(default)]
    pub post_author: String,
    #[serde(default)]
    pub post_url: String,
    #[serde(default)]
    pub post_text: String,
    /// Condition arena. Clause leaves index into this vector.
    pub given: Vec<Condition>,
    #[serde(default)]
    pub pre_predict: PrePredict,
    pub predict: Predict,
    #[serde(default)]
    pub state: PredictionState,
    #[serde(default)]
    pub prediction_type: PredictionType,
}

impl Prediction {
    pub fn condition(&self, r: ConditionRef) -> Option<&Condition> {
        self.given.get(r.0)
    }

    pub fn condition_mut(&mut self, r: ConditionRef) -> Option<&mut Condition> {
        self.given.get_mut(r.0)
    }

    pub fn condition_by_name(&self, name: &str) -> Option<&Condition> {
        self.given.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn is_final(&self) -> bool {
        self.state.value.is_final()
    }

    /// Recomputes `state` from the current condition states.
    pub fn evaluate(&mut self) -> PredictionValue {
        let pre = self.pre_predict.evaluate(&self.given);
        let value = if pre == PredictionValue::OngoingPrediction {
            self.predict.evaluate(&self.given)
        } else {
            pre
        };
        self.state.value = value;
        self.state.status = if value.is_final() {
            Status::Finished
        } else {
            Status::Started
        };
        let last_ts = self.given.iter().map(|c| c.state.last_ts).max().unwrap_or(0);
        self.state.last_ts = self.state.last_ts.max(last_ts);
        value
    }

    /// Undecided conditions of whichever phase is active, deduplicated in
    /// first-seen order. Empty once the prediction is final.
    pub fn actionable_undecided_conditions(&mut self) -> Vec<ConditionRef> {
        let refs = match self.evaluate() {
            PredictionValue::OngoingPrePrediction => {
                self.pre_predict.undecided_conditions(&self.given)
            }
            PredictionValue::OngoingPrediction => self.predict.undecided_conditions(&self.given),
            _ => Vec::new(),
        };
        let mut seen = Vec::with_capacity(refs.len());
        for r in refs {
            if !seen.contains(&r) {
                seen.push(r);
            }
        }
        seen
    }

    /// Resets every owned condition and the top-level state.
    pub fn clear_state(&mut self) {
        self.pre_predict.clear_state(&mut self.given);
        self.predict.clear_state(&mut self.given);
        for condition in &mut self.given {
            condition.clear_state();
        }
        self.state = PredictionState::default();
    }

    /// One-line human description for the supported prediction shapes.
    pub fn summary(&self) -> String {
        self.prediction_type.describe(self)
    }
}
