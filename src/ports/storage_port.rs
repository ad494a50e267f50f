//! Prediction storage port: the sole durability boundary of a batch.

use crate::domain::error::VerdictError;
use crate::domain::prediction::{Prediction, PredictionValue};
use std::collections::BTreeMap;

pub trait PredictionStore {
    /// Predictions whose current value is one of `values`, keyed by id.
    fn get_predictions(
        &self,
        values: &[PredictionValue],
    ) -> Result<BTreeMap<String, Prediction>, VerdictError>;

    /// Writes every prediction or none of them.
    fn upsert_predictions(
        &self,
        predictions: &BTreeMap<String, Prediction>,
    ) -> Result<(), VerdictError>;
}
