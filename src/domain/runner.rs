//! Drives predictions forward with market ticks.
//!
//! A [`PredictionRunner`] owns one prediction and the lazily opened tick
//! iterators of its conditions. Each `run()` call feeds at most one tick set
//! to every condition the active phase still needs. [`Runner::run`] loads all
//! ongoing predictions, calls every active runner until none is left active,
//! then persists the changed predictions in one write.

use crate::domain::bool_expr::ConditionRef;
use crate::domain::error::{RunError, VerdictError};
use crate::domain::market::Market;
use crate::domain::prediction::{Prediction, PredictionValue};
use crate::domain::tick_stream::TickIterator;
use crate::ports::storage_port::PredictionStore;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_PASSES: usize = 100_000;

pub struct PredictionRunner<'a> {
    prediction: Prediction,
    original: Prediction,
    market: &'a Market<'a>,
    now_ts: i64,
    /// Per condition index, one iterator per market operand.
    iterators: HashMap<usize, Vec<TickIterator>>,
    inactive: bool,
}

impl<'a> PredictionRunner<'a> {
    /// Fails when any condition references an operand the market cannot serve.
    pub fn new(
        prediction: Prediction,
        market: &'a Market<'a>,
        now_ts: i64,
    ) -> Result<Self, RunError> {
        for condition in &prediction.given {
            for operand in condition.market_operands() {
                market
                    .check_operand(operand)
                    .map_err(|source| RunError::Market {
                        id: prediction.id.clone(),
                        source,
                    })?;
            }
        }
        Ok(Self {
            original: prediction.clone(),
            prediction,
            market,
            now_ts,
            iterators: HashMap::new(),
            inactive: false,
        })
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn into_prediction(self) -> Prediction {
        self.prediction
    }

    pub fn is_inactive(&self) -> bool {
        self.inactive
    }

    pub fn has_changed(&self) -> bool {
        self.prediction != self.original
    }

    /// One pass over the active phase's undecided conditions.
    ///
    /// The runner goes inactive once the prediction is final, after a pass
    /// that fed no condition, or on the first market or ingestion error.
    pub fn run(&mut self) -> Vec<RunError> {
        if self.inactive {
            return Vec::new();
        }
        if self.prediction.is_final() {
            self.inactive = true;
            return Vec::new();
        }

        let mut fed = 0usize;
        for r in self.prediction.actionable_undecided_conditions() {
            match self.step(r) {
                Ok(true) => fed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Stopping runner: {}", e);
                    self.inactive = true;
                    self.prediction.evaluate();
                    return vec![e];
                }
            }
        }

        let value = self.prediction.evaluate();
        if value.is_final() {
            info!("Prediction {} resolved as {}", self.prediction.id, value);
            self.inactive = true;
        } else if fed == 0 {
            debug!(
                "Prediction {} has no more ticks this batch, still {}",
                self.prediction.id, value
            );
            self.inactive = true;
        }
        Vec::new()
    }

    /// Feeds one synchronized tick set to a condition. `Ok(false)` when one
    /// of its streams has run dry.
    fn step(&mut self, r: ConditionRef) -> Result<bool, RunError> {
        let Some(condition) = self.prediction.condition(r) else {
            return Ok(false);
        };

        if !self.iterators.contains_key(&r.0) {
            let start_ts = condition.from_ts.max(condition.state.last_ts);
            let mut opened = Vec::new();
            for operand in condition.market_operands() {
                let it = self
                    .market
                    .get_tick_iterator(operand, start_ts, self.now_ts)
                    .map_err(|source| RunError::Market {
                        id: self.prediction.id.clone(),
                        source,
                    })?;
                opened.push(it);
            }
            self.iterators.insert(r.0, opened);
        }

        let Some(iterators) = self.iterators.get_mut(&r.0) else {
            return Ok(false);
        };
        if iterators.iter().any(TickIterator::is_exhausted) {
            return Ok(false);
        }

        let mut ticks = BTreeMap::new();
        for it in iterators.iter_mut() {
            match it.next_tick() {
                Ok(tick) => {
                    ticks.insert(it.operand_key().to_string(), tick);
                }
                Err(e) if e.is_exhausted() => return Ok(false),
                Err(source) => {
                    return Err(RunError::Market {
                        id: self.prediction.id.clone(),
                        source,
                    });
                }
            }
        }

        let id = &self.prediction.id;
        let Some(condition) = self.prediction.given.get_mut(r.0) else {
            return Ok(false);
        };
        debug!("Feeding {} ticks {:?}", condition.name, ticks);
        condition
            .run(&ticks)
            .map_err(|source| RunError::Condition {
                id: id.clone(),
                source,
            })?;
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Ongoing predictions loaded from storage.
    pub loaded: usize,
    pub passes: usize,
    pub errors: Vec<RunError>,
    /// Predictions whose state changed, as persisted.
    pub changed: BTreeMap<String, Prediction>,
}

impl RunReport {
    pub fn resolved(&self) -> impl Iterator<Item = &Prediction> {
        self.changed.values().filter(|p| p.is_final())
    }
}

pub struct Runner<'a> {
    store: &'a dyn PredictionStore,
    market: &'a Market<'a>,
    max_passes: usize,
}

impl<'a> Runner<'a> {
    pub fn new(store: &'a dyn PredictionStore, market: &'a Market<'a>) -> Self {
        Self {
            store,
            market,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Runs one batch using ticks up to `now_ts`.
    ///
    /// Storage failures abort the batch; nothing is written in that case.
    /// Per-prediction failures are collected in the report.
    pub fn run(&self, now_ts: i64) -> Result<RunReport, VerdictError> {
        let predictions = self.store.get_predictions(&PredictionValue::ONGOING)?;
        let mut report = RunReport {
            loaded: predictions.len(),
            ..RunReport::default()
        };

        let mut active = Vec::with_capacity(predictions.len());
        for (_, prediction) in predictions {
            match PredictionRunner::new(prediction, self.market, now_ts) {
                Ok(runner) => active.push(runner),
                Err(e) => {
                    warn!("Skipping prediction: {}", e);
                    report.errors.push(e);
                }
            }
        }

        let mut done = Vec::with_capacity(active.len());
        while !active.is_empty() {
            if report.passes >= self.max_passes {
                warn!(
                    "Stopping after {} passes with {} runners still active",
                    report.passes,
                    active.len()
                );
                break;
            }
            report.passes += 1;
            for runner in active.iter_mut() {
                report.errors.extend(runner.run());
            }
            let (finished, still_active): (Vec<_>, Vec<_>) =
                active.into_iter().partition(PredictionRunner::is_inactive);
            done.extend(finished);
            active = still_active;
        }
        done.extend(active);

        for runner in done {
            if runner.has_changed() {
                let prediction = runner.into_prediction();
                report.changed.insert(prediction.id.clone(), prediction);
            }
        }
        if !report.changed.is_empty() {
            self.store.upsert_predictions(&report.changed)?;
        }

        info!(
            "Batch done: {} loaded, {} changed, {} resolved, {} failed in {} passes",
            report.loaded,
            report.changed.len(),
            report.resolved().count(),
            report.errors.len(),
            report.passes
        );
        Ok(report)
    }
}
