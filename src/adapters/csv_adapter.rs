//! CSV candle source.
//!
//! One file per operand under a base directory, named after the operand key
//! with `:` replaced by `_` (`COIN_BINANCE_BTC-USDT.csv`). Columns are
//! `timestamp,open,high,low,close,volume`; `timestamp` is unix seconds or
//! ISO8601.

use crate::domain::candle::Candle;
use crate::domain::compiler::parse_iso8601;
use crate::domain::error::MarketError;
use crate::ports::candle_port::{CandleFeed, CandlePort, VecCandleFeed};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn csv_path(&self, operand_key: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.csv", operand_key.replace(':', "_")))
    }

    /// All candles in the operand's file at or after `start_ts`, sorted.
    pub fn read_candles(&self, operand_key: &str, start_ts: i64) -> Result<Vec<Candle>, MarketError> {
        let upstream = |reason: String| MarketError::Upstream {
            operand: operand_key.to_string(),
            reason,
        };
        let path = self.csv_path(operand_key);
        let content = fs::read_to_string(&path)
            .map_err(|e| upstream(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| upstream(format!("CSV parse error: {}", e)))?;
            let field = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| upstream(format!("row {}: missing {} column", line + 1, name)))
            };
            let number = |idx: usize, name: &str| -> Result<f64, MarketError> {
                let value: f64 = field(idx, name)?
                    .parse()
                    .map_err(|e| upstream(format!("row {}: invalid {} value: {}", line + 1, name, e)))?;
                if !value.is_finite() {
                    return Err(upstream(format!("row {}: non-finite {} value", line + 1, name)));
                }
                Ok(value)
            };

            let timestamp = parse_timestamp(field(0, "timestamp")?)
                .map_err(|e| upstream(format!("row {}: {}", line + 1, e)))?;
            if timestamp < start_ts {
                continue;
            }

            candles.push(Candle {
                timestamp,
                open: number(1, "open")?,
                high: number(2, "high")?,
                low: number(3, "low")?,
                close: number(4, "close")?,
                volume: number(5, "volume").unwrap_or(0.0),
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        debug!("Loaded {} candles from {}", candles.len(), path.display());
        Ok(candles)
    }
}

fn parse_timestamp(value: &str) -> Result<i64, String> {
    match value.parse::<i64>() {
        Ok(ts) => Ok(ts),
        Err(_) => parse_iso8601(value).map(|dt| dt.timestamp()),
    }
}

impl CandlePort for CsvAdapter {
    fn open_feed(
        &self,
        operand_key: &str,
        start_ts: i64,
    ) -> Result<Box<dyn CandleFeed>, MarketError> {
        let candles = self.read_candles(operand_key, start_ts)?;
        Ok(Box::new(VecCandleFeed::new(candles)))
    }
}
