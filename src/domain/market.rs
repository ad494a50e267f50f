//! Market collaborator: resolves an operand to a tick iterator.
//!
//! Supported providers come from an explicit [`MarketConfig`] built once at
//! start-up and passed in; there is no process-wide registry.

use crate::domain::candle::MIN_CANDLE_INTERVAL_SECS;
use crate::domain::error::{MarketError, VerdictError};
use crate::domain::operand::Operand;
use crate::domain::tick_stream::TickIterator;
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_CANDLE_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    /// Upper-cased provider names.
    pub providers: Vec<String>,
    pub candle_interval_secs: i64,
}

impl MarketConfig {
    pub fn new(providers: &[&str], candle_interval_secs: i64) -> Self {
        Self {
            providers: providers.iter().map(|p| p.trim().to_uppercase()).collect(),
            candle_interval_secs,
        }
    }

    /// Reads `[market]`. Call `validate_config` first for friendly errors.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VerdictError> {
        let providers: Vec<String> = config
            .get_list("market", "providers")
            .into_iter()
            .map(|p| p.to_uppercase())
            .collect();
        if providers.is_empty() {
            return Err(VerdictError::ConfigMissing {
                section: "market".to_string(),
                key: "providers".to_string(),
            });
        }
        let candle_interval_secs =
            config.get_int("market", "candle_interval_secs", DEFAULT_CANDLE_INTERVAL_SECS);
        if candle_interval_secs < MIN_CANDLE_INTERVAL_SECS {
            return Err(VerdictError::ConfigInvalid {
                section: "market".to_string(),
                key: "candle_interval_secs".to_string(),
                reason: format!(
                    "candle_interval_secs must be at least {}",
                    MIN_CANDLE_INTERVAL_SECS
                ),
            });
        }
        Ok(Self {
            providers,
            candle_interval_secs,
        })
    }

    pub fn supports(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p.eq_ignore_ascii_case(provider))
    }
}

pub struct Market<'a> {
    config: MarketConfig,
    candles: &'a dyn CandlePort,
}

impl<'a> Market<'a> {
    pub fn new(config: MarketConfig, candles: &'a dyn CandlePort) -> Self {
        Self { config, candles }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Fails for NUMBER operands and providers outside the configuration.
    pub fn check_operand(&self, operand: &Operand) -> Result<(), MarketError> {
        match operand.provider() {
            None => Err(MarketError::UnsupportedOperand(operand.key())),
            Some(provider) if !self.config.supports(provider) => {
                Err(MarketError::UnsupportedProvider {
                    provider: provider.to_string(),
                    operand: operand.key(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Ticks for `operand` in `[start_ts, now_ts]`.
    pub fn get_tick_iterator(
        &self,
        operand: &Operand,
        start_ts: i64,
        now_ts: i64,
    ) -> Result<TickIterator, MarketError> {
        self.check_operand(operand)?;
        let key = operand.key();
        let interval = self.config.candle_interval_secs;
        let candle_start = start_ts - start_ts.rem_euclid(interval);
        let feed = self.candles.open_feed(&key, candle_start)?;
        Ok(TickIterator::new(&key, feed, interval, start_ts, now_ts))
    }
}
