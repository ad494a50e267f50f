//! Pre-predict and predict phases and the policy that maps clause values to
//! a lifecycle value.
//!
//! Both phases combine up to three clauses. `annulled_if` is consulted first
//! and pre-empts everything when TRUE, then `wrong_if`, then the main clause.
//! Missing `wrong_if`/`annulled_if` clauses count as FALSE, a missing
//! `predict_if` counts as TRUE.

use crate::domain::bool_expr::{BoolExpr, ConditionRef};
use crate::domain::condition::Condition;
use crate::domain::prediction::PredictionValue;
use crate::domain::trilean::Trilean;
use serde::{Deserialize, Serialize};

/// Resolution policy for the predict phase.
pub fn resolve_predict(
    predict: Trilean,
    wrong_if: Trilean,
    annulled_if: Trilean,
    ignore_undecided_if_predict_is_defined: bool,
    annulled_if_predict_is_false: bool,
) -> PredictionValue {
    let (wrong_if, annulled_if) =
        settle_side_clauses(predict, wrong_if, annulled_if, ignore_undecided_if_predict_is_defined);

    if annulled_if == Trilean::True {
        return PredictionValue::Annulled;
    }
    if wrong_if == Trilean::True {
        return PredictionValue::Incorrect;
    }
    let outcome = match predict {
        Trilean::False if annulled_if_predict_is_false => PredictionValue::Annulled,
        Trilean::False => PredictionValue::Incorrect,
        Trilean::True if wrong_if == Trilean::False => PredictionValue::Correct,
        Trilean::True | Trilean::Undecided => PredictionValue::OngoingPrediction,
    };
    // Pending annulment keeps the prediction open.
    if annulled_if == Trilean::Undecided && outcome.is_final() {
        return PredictionValue::OngoingPrediction;
    }
    outcome
}

/// Resolution policy for the pre-predict phase. ONGOING_PREDICTION means the
/// predict phase may start.
pub fn resolve_pre_predict(
    predict_if: Trilean,
    wrong_if: Trilean,
    annulled_if: Trilean,
    ignore_undecided_if_predict_is_defined: bool,
    annulled_if_predict_is_false: bool,
) -> PredictionValue {
    let (wrong_if, annulled_if) = settle_side_clauses(
        predict_if,
        wrong_if,
        annulled_if,
        ignore_undecided_if_predict_is_defined,
    );

    if annulled_if == Trilean::True {
        return PredictionValue::Annulled;
    }
    if wrong_if == Trilean::True {
        return PredictionValue::Incorrect;
    }
    if [predict_if, wrong_if, annulled_if].contains(&Trilean::Undecided) {
        return PredictionValue::OngoingPrePrediction;
    }
    match predict_if {
        Trilean::False if annulled_if_predict_is_false => PredictionValue::Annulled,
        Trilean::False => PredictionValue::Incorrect,
        _ => PredictionValue::OngoingPrediction,
    }
}

fn settle_side_clauses(
    main: Trilean,
    wrong_if: Trilean,
    annulled_if: Trilean,
    ignore_undecided: bool,
) -> (Trilean, Trilean) {
    if ignore_undecided && main.is_decided() {
        (wrong_if.or_false(), annulled_if.or_false())
    } else {
        (wrong_if, annulled_if)
    }
}

fn clause_or_false(expr: Option<&BoolExpr>, conditions: &[Condition]) -> Trilean {
    expr.map(|e| e.evaluate(conditions)).unwrap_or(Trilean::False)
}

fn collect_undecided(
    clauses: &[Option<&BoolExpr>],
    conditions: &[Condition],
) -> Vec<ConditionRef> {
    clauses
        .iter()
        .flatten()
        .flat_map(|e| e.undecided_conditions(conditions))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrePredict {
    pub wrong_if: Option<BoolExpr>,
    pub annulled_if: Option<BoolExpr>,
    pub predict_if: Option<BoolExpr>,
    #[serde(default)]
    pub ignore_undecided_if_predict_is_defined: bool,
    #[serde(default)]
    pub annulled_if_predict_is_false: bool,
}

impl PrePredict {
    pub fn is_empty(&self) -> bool {
        self.wrong_if.is_none() && self.annulled_if.is_none() && self.predict_if.is_none()
    }

    pub fn evaluate(&self, conditions: &[Condition]) -> PredictionValue {
        let predict_if = self
            .predict_if
            .as_ref()
            .map(|e| e.evaluate(conditions))
            .unwrap_or(Trilean::True);
        resolve_pre_predict(
            predict_if,
            clause_or_false(self.wrong_if.as_ref(), conditions),
            clause_or_false(self.annulled_if.as_ref(), conditions),
            self.ignore_undecided_if_predict_is_defined,
            self.annulled_if_predict_is_false,
        )
    }

    pub fn undecided_conditions(&self, conditions: &[Condition]) -> Vec<ConditionRef> {
        collect_undecided(&self.clauses(), conditions)
    }

    pub fn clear_state(&self, conditions: &mut [Condition]) {
        for clause in self.clauses().into_iter().flatten() {
            clause.clear_state(conditions);
        }
    }

    fn clauses(&self) -> [Option<&BoolExpr>; 3] {
        [
            self.wrong_if.as_ref(),
            self.annulled_if.as_ref(),
            self.predict_if.as_ref(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predict {
    pub wrong_if: Option<BoolExpr>,
    pub annulled_if: Option<BoolExpr>,
    pub predict: BoolExpr,
    #[serde(default)]
    pub ignore_undecided_if_predict_is_defined: bool,
    #[serde(default)]
    pub annulled_if_predict_is_false: bool,
}

impl Predict {
    pub fn new(predict: BoolExpr) -> Self {
        Self {
            wrong_if: None,
            annulled_if: None,
            predict,
            ignore_undecided_if_predict_is_defined: false,
            annulled_if_predict_is_false: false,
        }
    }

    pub fn evaluate(&self, conditions: &[Condition]) -> PredictionValue {
        resolve_predict(
            self.predict.evaluate(conditions),
            clause_or_false(self.wrong_if.as_ref(), conditions),
            clause_or_false(self.annulled_if.as_ref(), conditions),
            self.ignore_undecided_if_predict_is_defined,
            self.annulled_if_predict_is_false,
        )
    }

    pub fn undecided_conditions(&self, conditions: &[Condition]) -> Vec<ConditionRef> {
        collect_undecided(&self.clauses(), conditions)
    }

    pub fn clear_state(&self, conditions: &mut [Condition]) {
        for clause in self.clauses().into_iter().flatten() {
            clause.clear_state(conditions);
        }
    }

    fn clauses(&self) -> [Option<&BoolExpr>; 3] {
        [
            self.wrong_if.as_ref(),
            self.annulled_if.as_ref(),
            Some(&self.predict),
        ]
    }
}
