//! Closed set of recognised prediction shapes.
//!
//! The tag is inferred once at compile time and only drives presentation:
//! evaluation never looks at it.

use crate::domain::bool_expr::BoolExpr;
use crate::domain::condition::{Condition, Operator};
use crate::domain::operand::Operand;
use crate::domain::prediction::Prediction;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionType {
    #[default]
    Unsupported,
    /// `COIN op NUMBER` by a deadline.
    CoinOperatorFloatDeadline,
    /// `COIN BETWEEN a AND b` by a deadline.
    CoinWillRange,
    /// Predict on one level, wrong if another level is hit first.
    CoinWillReachBeforeItReaches,
    /// Predict on one level, annulled if another level is hit first.
    CoinWillReachInvalidatedIfItReaches,
}

impl PredictionType {
    pub fn infer(prediction: &Prediction) -> PredictionType {
        if !prediction.pre_predict.is_empty() {
            return PredictionType::Unsupported;
        }
        let Some(main) = literal_condition(prediction, Some(&prediction.predict.predict)) else {
            return PredictionType::Unsupported;
        };
        let wrong = literal_condition(prediction, prediction.predict.wrong_if.as_ref());
        let annulled = literal_condition(prediction, prediction.predict.annulled_if.as_ref());

        match (
            prediction.predict.wrong_if.is_some(),
            prediction.predict.annulled_if.is_some(),
        ) {
            (false, false) if main.operator == Operator::Between => PredictionType::CoinWillRange,
            (false, false) => PredictionType::CoinOperatorFloatDeadline,
            (true, false) if is_rival_level(main, wrong) => {
                PredictionType::CoinWillReachBeforeItReaches
            }
            (false, true) if is_rival_level(main, annulled) => {
                PredictionType::CoinWillReachInvalidatedIfItReaches
            }
            _ => PredictionType::Unsupported,
        }
    }

    pub fn describe(self, prediction: &Prediction) -> String {
        let main = literal_condition(prediction, Some(&prediction.predict.predict));
        let other = literal_condition(
            prediction,
            prediction
                .predict
                .wrong_if
                .as_ref()
                .or(prediction.predict.annulled_if.as_ref()),
        );
        match (self, main, other) {
            (PredictionType::CoinOperatorFloatDeadline, Some(m), _) => format!(
                "{} {} {} by {}",
                m.operands[0],
                m.operator,
                m.operands[1],
                format_ts(m.to_ts)
            ),
            (PredictionType::CoinWillRange, Some(m), _) => format!(
                "{} will be between {} and {} by {}",
                m.operands[0],
                m.operands[1],
                m.operands[2],
                format_ts(m.to_ts)
            ),
            (PredictionType::CoinWillReachBeforeItReaches, Some(m), Some(o)) => format!(
                "{} will reach {} before it reaches {}, by {}",
                m.operands[0],
                m.operands[1],
                o.operands[1],
                format_ts(m.to_ts)
            ),
            (PredictionType::CoinWillReachInvalidatedIfItReaches, Some(m), Some(o)) => format!(
                "{} will reach {} by {}, annulled if it reaches {} first",
                m.operands[0],
                m.operands[1],
                format_ts(m.to_ts),
                o.operands[1]
            ),
            _ => format!(
                "predict: {}",
                prediction.predict.predict.render(&prediction.given)
            ),
        }
    }
}

/// The condition behind a clause that is a single coin-vs-number literal.
fn literal_condition<'a>(
    prediction: &'a Prediction,
    expr: Option<&BoolExpr>,
) -> Option<&'a Condition> {
    match expr {
        Some(BoolExpr::Literal(r)) => prediction
            .condition(*r)
            .filter(|c| is_coin_against_numbers(c)),
        _ => None,
    }
}

fn is_coin_against_numbers(condition: &Condition) -> bool {
    matches!(condition.operands.first(), Some(Operand::Coin { .. }))
        && condition.operands[1..].iter().all(Operand::is_number)
}

fn is_rival_level(main: &Condition, other: Option<&Condition>) -> bool {
    match other {
        Some(o) => {
            main.operator != Operator::Between
                && o.operator != Operator::Between
                && main.operands[0] == o.operands[0]
        }
        None => false,
    }
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
