#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
pub use verdict::domain::candle::Candle;
use verdict::domain::compiler::compile_json;
use verdict::domain::error::{MarketError, VerdictError};
use verdict::domain::prediction::{Prediction, PredictionValue};
use verdict::ports::candle_port::{CandleFeed, CandlePort, VecCandleFeed};
use verdict::ports::storage_port::PredictionStore;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

/// 2024-01-01T00:00:00Z
pub const T0: i64 = 1_704_067_200;
pub const MINUTE: i64 = 60;
pub const DAY: i64 = 86_400;

pub struct MockCandlePort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
    pub opened: RefCell<Vec<(String, i64)>>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            opened: RefCell::new(Vec::new()),
        }
    }

    pub fn with_candles(mut self, key: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(key.to_string(), candles);
        self
    }

    /// One flat candle per minute from `start`, valued at each close.
    pub fn with_closes(self, key: &str, start: i64, closes: &[f64]) -> Self {
        self.with_candles(key, flat_candles(start, closes))
    }

    pub fn with_error(mut self, key: &str, reason: &str) -> Self {
        self.errors.insert(key.to_string(), reason.to_string());
        self
    }
}

impl CandlePort for MockCandlePort {
    fn open_feed(
        &self,
        operand_key: &str,
        start_ts: i64,
    ) -> Result<Box<dyn CandleFeed>, MarketError> {
        self.opened
            .borrow_mut()
            .push((operand_key.to_string(), start_ts));
        if let Some(reason) = self.errors.get(operand_key) {
            return Err(MarketError::Upstream {
                operand: operand_key.to_string(),
                reason: reason.clone(),
            });
        }
        let candles = self
            .data
            .get(operand_key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.timestamp >= start_ts)
            .collect();
        Ok(Box::new(VecCandleFeed::new(candles)))
    }
}

/// In-memory prediction store that can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    pub predictions: RefCell<BTreeMap<String, Prediction>>,
    pub fail_reads: Cell<bool>,
    pub fail_writes: Cell<bool>,
    pub writes: Cell<usize>,
}

impl MemoryStore {
    pub fn with(predictions: Vec<Prediction>) -> Self {
        let store = Self::default();
        for p in predictions {
            store.predictions.borrow_mut().insert(p.id.clone(), p);
        }
        store
    }

    pub fn get(&self, id: &str) -> Prediction {
        self.predictions.borrow()[id].clone()
    }
}

impl PredictionStore for MemoryStore {
    fn get_predictions(
        &self,
        values: &[PredictionValue],
    ) -> Result<BTreeMap<String, Prediction>, VerdictError> {
        if self.fail_reads.get() {
            return Err(VerdictError::Database {
                reason: "read failed".into(),
            });
        }
        Ok(self
            .predictions
            .borrow()
            .iter()
            .filter(|(_, p)| values.is_empty() || values.contains(&p.state.value))
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect())
    }

    fn upsert_predictions(
        &self,
        predictions: &BTreeMap<String, Prediction>,
    ) -> Result<(), VerdictError> {
        if self.fail_writes.get() {
            return Err(VerdictError::DatabaseQuery {
                reason: "write failed".into(),
            });
        }
        self.writes.set(self.writes.get() + 1);
        let mut stored = self.predictions.borrow_mut();
        for (id, p) in predictions {
            stored.insert(id.clone(), p.clone());
        }
        Ok(())
    }
}

pub fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: ts,
        open,
        high,
        low,
        close,
        volume: 1.0,
    }
}

pub fn flat_candles(start: i64, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| candle(start + MINUTE * i as i64, *c, *c, *c, *c))
        .collect()
}

pub fn created_at() -> DateTime<Utc> {
    Utc.timestamp_opt(T0, 0).unwrap()
}

pub fn compile(json: &str) -> Prediction {
    compile_json(json, created_at()).unwrap()
}

/// `<key> <op> <threshold>` over the first two weeks of 2024.
pub fn simple_prediction(id: &str, clause: &str) -> Prediction {
    compile(&format!(
        r#"{{
            "id": "{id}",
            "postedAt": "2024-01-01T00:00:00Z",
            "given": {{ "main": {{ "condition": "{clause}", "toDuration": "2w" }} }},
            "predict": {{ "predict": "main" }}
        }}"#
    ))
}
