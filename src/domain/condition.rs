//! Atomic price conditions and their tick-driven state machine.
//!
//! A condition compares one market operand against a number or another
//! operand inside a `[from_ts, to_ts]` window. It starts UNSTARTED, becomes
//! STARTED on the first in-window tick and FINISHED as soon as the comparison
//! holds (TRUE) or a tick past `to_ts` arrives first (FALSE). Once FINISHED it
//! never changes again.

use crate::domain::candle::Tick;
use crate::domain::error::ConditionError;
use crate::domain::operand::Operand;
use crate::domain::trilean::Trilean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "BETWEEN")]
    Between,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Operator> {
        match symbol.to_uppercase().as_str() {
            "==" => Some(Operator::Eq),
            ">" => Some(Operator::Gt),
            "<" => Some(Operator::Lt),
            ">=" => Some(Operator::Gte),
            "<=" => Some(Operator::Lte),
            "BETWEEN" => Some(Operator::Between),
            _ => None,
        }
    }

    pub fn operand_count(self) -> usize {
        match self {
            Operator::Between => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "==",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Between => "BETWEEN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Unstarted,
    Started,
    Finished,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unstarted => "UNSTARTED",
            Status::Started => "STARTED",
            Status::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionState {
    pub status: Status,
    pub last_ts: i64,
    pub last_ticks: BTreeMap<String, Tick>,
    pub value: Trilean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub operator: Operator,
    pub operands: Vec<Operand>,
    pub from_ts: i64,
    pub to_ts: i64,
    pub error_margin_ratio: f64,
    #[serde(default)]
    pub state: ConditionState,
}

impl Condition {
    pub fn new(
        name: &str,
        operator: Operator,
        operands: Vec<Operand>,
        from_ts: i64,
        to_ts: i64,
        error_margin_ratio: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            operator,
            operands,
            from_ts,
            to_ts,
            error_margin_ratio,
            state: ConditionState::default(),
        }
    }

    pub fn evaluate(&self) -> Trilean {
        self.state.value
    }

    pub fn is_finished(&self) -> bool {
        self.state.status == Status::Finished
    }

    pub fn clear_state(&mut self) {
        self.state = ConditionState::default();
    }

    /// Operands that need a market stream, in declaration order.
    pub fn market_operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().filter(|op| !op.is_number())
    }

    /// Feeds one synchronized set of ticks, keyed by operand key.
    pub fn run(&mut self, ticks: &BTreeMap<String, Tick>) -> Result<(), ConditionError> {
        if self.is_finished() {
            return Ok(());
        }

        let mut timestamps = ticks.values().map(|t| t.timestamp);
        let ts = timestamps.next().ok_or_else(|| ConditionError::NoTicksSupplied {
            name: self.name.clone(),
        })?;
        if timestamps.any(|other| other != ts) {
            return Err(ConditionError::MismatchedTimestamps {
                name: self.name.clone(),
            });
        }
        for operand in self.market_operands() {
            let key = operand.key();
            if !ticks.contains_key(&key) {
                return Err(ConditionError::MissingOperandTick {
                    name: self.name.clone(),
                    operand: key,
                });
            }
        }
        if ts < self.state.last_ts {
            return Err(ConditionError::StaleTimestamp {
                name: self.name.clone(),
                timestamp: ts,
                last_ts: self.state.last_ts,
            });
        }

        if ts < self.from_ts {
            return Ok(());
        }

        self.state.last_ts = ts;
        self.state.last_ticks = ticks.clone();

        if ts > self.to_ts {
            self.state.status = Status::Finished;
            self.state.value = Trilean::False;
            return Ok(());
        }

        self.state.status = Status::Started;
        if self.holds(ticks) {
            self.state.status = Status::Finished;
            self.state.value = Trilean::True;
        }
        Ok(())
    }

    fn resolve(&self, operand: &Operand, ticks: &BTreeMap<String, Tick>) -> f64 {
        match operand {
            Operand::Number { value } => *value,
            other => ticks
                .get(&other.key())
                .map(|t| t.value)
                .unwrap_or(f64::NAN),
        }
    }

    fn holds(&self, ticks: &BTreeMap<String, Tick>) -> bool {
        let values: Vec<f64> = self
            .operands
            .iter()
            .map(|op| self.resolve(op, ticks))
            .collect();
        if values.len() < self.operator.operand_count() {
            return false;
        }
        let ratio = self.error_margin_ratio;
        let lhs = values[0];
        let rhs = values[1];
        match self.operator {
            Operator::Gt => lhs > lower_by(rhs, ratio),
            Operator::Gte => lhs >= lower_by(rhs, ratio) - EPSILON,
            Operator::Lt => lhs < raise_by(rhs, ratio),
            Operator::Lte => lhs <= raise_by(rhs, ratio) + EPSILON,
            Operator::Eq => {
                lhs >= lower_by(rhs, ratio) - EPSILON && lhs <= raise_by(rhs, ratio) + EPSILON
            }
            Operator::Between => {
                let (low, high) = if rhs <= values[2] {
                    (rhs, values[2])
                } else {
                    (values[2], rhs)
                };
                lhs >= lower_by(low, ratio) - EPSILON && lhs <= raise_by(high, ratio) + EPSILON
            }
        }
    }
}

fn lower_by(threshold: f64, ratio: f64) -> f64 {
    threshold - threshold.abs() * ratio
}

fn raise_by(threshold: f64, ratio: f64) -> f64 {
    threshold + threshold.abs() * ratio
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.operator, self.operands.as_slice()) {
            (Operator::Between, [a, b, c]) => write!(f, "{} BETWEEN {} AND {}", a, b, c)?,
            (op, [a, b]) => write!(f, "{} {} {}", a, op, b)?,
            (op, operands) => {
                let names: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                write!(f, "{} {}", op, names.join(" "))?
            }
        }
        if self.error_margin_ratio > 0.0 {
            write!(f, " (±{}%)", self.error_margin_ratio * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BTC: &str = "COIN:BINANCE:BTC-USDT";
    const ETH: &str = "COIN:BINANCE:ETH-USDT";
    const T0: i64 = 1_700_000_000;
    const T1: i64 = T0 + 86_400;

    fn btc() -> Operand {
        Operand::coin("BINANCE", "BTC", "USDT")
    }

    fn above(threshold: f64, ratio: f64) -> Condition {
        Condition::new(
            "main",
            Operator::Gt,
            vec![btc(), Operand::number(threshold)],
            T0,
            T1,
            ratio,
        )
    }

    fn ticks(entries: &[(&str, i64, f64)]) -> BTreeMap<String, Tick> {
        entries
            .iter()
            .map(|(k, ts, v)| (k.to_string(), Tick::new(*ts, *v)))
            .collect()
    }

    #[test]
    fn new_condition_is_unstarted_and_undecided() {
        let c = above(60000.0, 0.0);
        assert_eq!(c.state.status, Status::Unstarted);
        assert_eq!(c.evaluate(), Trilean::Undecided);
    }

    #[test]
    fn tick_meeting_threshold_finishes_true() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0, 61000.0)])).unwrap();
        assert_eq!(c.state.status, Status::Finished);
        assert_eq!(c.evaluate(), Trilean::True);
        assert_eq!(c.state.last_ts, T0);
    }

    #[test]
    fn tick_below_threshold_stays_started() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0 + 60, 59000.0)])).unwrap();
        assert_eq!(c.state.status, Status::Started);
        assert_eq!(c.evaluate(), Trilean::Undecided);
        assert_eq!(c.state.last_ticks[BTC].value, 59000.0);
    }

    #[test]
    fn error_margin_lowers_greater_than_threshold() {
        let mut c = above(60000.0, 0.1);
        c.run(&ticks(&[(BTC, T0, 59000.0)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::True);
    }

    #[test]
    fn error_margin_raises_less_than_threshold() {
        let mut c = Condition::new(
            "dip",
            Operator::Lt,
            vec![btc(), Operand::number(30000.0)],
            T0,
            T1,
            0.05,
        );
        c.run(&ticks(&[(BTC, T0, 31000.0)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::True);
    }

    #[test]
    fn between_band_widened_on_both_sides() {
        let mut c = Condition::new(
            "range",
            Operator::Between,
            vec![btc(), Operand::number(50000.0), Operand::number(60000.0)],
            T0,
            T1,
            0.1,
        );
        c.run(&ticks(&[(BTC, T0, 65000.0)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::True);

        let mut strict = Condition {
            error_margin_ratio: 0.0,
            ..c.clone()
        };
        strict.clear_state();
        strict.run(&ticks(&[(BTC, T0, 65000.0)])).unwrap();
        assert_eq!(strict.evaluate(), Trilean::Undecided);
    }

    #[test]
    fn equality_uses_epsilon() {
        let mut c = Condition::new(
            "eq",
            Operator::Eq,
            vec![btc(), Operand::number(100.0)],
            T0,
            T1,
            0.0,
        );
        c.run(&ticks(&[(BTC, T0, 100.0 + 1e-12)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::True);
    }

    #[test]
    fn two_market_operands() {
        let mut c = Condition::new(
            "flip",
            Operator::Gte,
            vec![Operand::coin("BINANCE", "ETH", "USDT"), btc()],
            T0,
            T1,
            0.0,
        );
        c.run(&ticks(&[(BTC, T0, 100.0), (ETH, T0, 90.0)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::Undecided);
        c.run(&ticks(&[(BTC, T0 + 60, 100.0), (ETH, T0 + 60, 100.0)]))
            .unwrap();
        assert_eq!(c.evaluate(), Trilean::True);
    }

    #[test]
    fn tick_past_deadline_finishes_false() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T1 + 1, 59000.0)])).unwrap();
        assert_eq!(c.state.status, Status::Finished);
        assert_eq!(c.evaluate(), Trilean::False);
    }

    #[test]
    fn deadline_wins_even_if_value_would_hold() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T1 + 1, 70000.0)])).unwrap();
        assert_eq!(c.evaluate(), Trilean::False);
    }

    #[test]
    fn finished_condition_ignores_further_input() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0, 61000.0)])).unwrap();
        let snapshot = c.state.clone();
        c.run(&ticks(&[(BTC, T1 + 10, 1.0)])).unwrap();
        c.run(&ticks(&[(BTC, T0 - 10, 1.0)])).unwrap();
        c.run(&BTreeMap::new()).unwrap();
        assert_eq!(c.state, snapshot);
    }

    #[test]
    fn pre_window_tick_is_ignored() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0 - 1, 70000.0)])).unwrap();
        assert_eq!(c.state, ConditionState::default());
    }

    #[test]
    fn empty_ticks_rejected() {
        let mut c = above(60000.0, 0.0);
        let err = c.run(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConditionError::NoTicksSupplied { .. }));
    }

    #[test]
    fn mismatched_timestamps_rejected_without_mutation() {
        let mut c = Condition::new(
            "flip",
            Operator::Gt,
            vec![Operand::coin("BINANCE", "ETH", "USDT"), btc()],
            T0,
            T1,
            0.0,
        );
        let err = c
            .run(&ticks(&[(BTC, T0, 1.0), (ETH, T0 + 1, 2.0)]))
            .unwrap_err();
        assert!(matches!(err, ConditionError::MismatchedTimestamps { .. }));
        assert_eq!(c.state, ConditionState::default());
    }

    #[test]
    fn missing_operand_rejected() {
        let mut c = above(60000.0, 0.0);
        let err = c.run(&ticks(&[(ETH, T0, 70000.0)])).unwrap_err();
        match err {
            ConditionError::MissingOperandTick { operand, .. } => assert_eq!(operand, BTC),
            other => panic!("expected MissingOperandTick, got {other:?}"),
        }
        assert_eq!(c.state.status, Status::Unstarted);
    }

    #[test]
    fn stale_timestamp_rejected_without_mutation() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0 + 100, 1.0)])).unwrap();
        let snapshot = c.state.clone();
        let err = c.run(&ticks(&[(BTC, T0 + 50, 70000.0)])).unwrap_err();
        assert!(matches!(err, ConditionError::StaleTimestamp { .. }));
        assert_eq!(c.state, snapshot);
    }

    #[test]
    fn repeated_timestamp_is_accepted() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0 + 100, 1.0)])).unwrap();
        c.run(&ticks(&[(BTC, T0 + 100, 1.0)])).unwrap();
        assert_eq!(c.state.status, Status::Started);
    }

    #[test]
    fn clear_state_resets() {
        let mut c = above(60000.0, 0.0);
        c.run(&ticks(&[(BTC, T0, 61000.0)])).unwrap();
        c.clear_state();
        assert_eq!(c.state.status, Status::Unstarted);
        assert_eq!(c.state.last_ts, 0);
        assert!(c.state.last_ticks.is_empty());
        assert_eq!(c.evaluate(), Trilean::Undecided);
    }

    #[test]
    fn margin_helpers_handle_negative_thresholds() {
        assert_relative_eq!(lower_by(-100.0, 0.1), -110.0);
        assert_relative_eq!(raise_by(-100.0, 0.1), -90.0);
    }

    #[test]
    fn display_renders_clause() {
        let c = above(60000.0, 0.25);
        assert_eq!(c.to_string(), format!("{} > 60000 (±25%)", BTC));
    }
}
