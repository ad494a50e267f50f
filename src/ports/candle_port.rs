//! Candle source port: one forward-only candle feed per market operand.

use crate::domain::candle::Candle;
use crate::domain::error::MarketError;
use std::collections::VecDeque;

/// Forward-only producer of candles in ascending timestamp order.
///
/// Returns `MarketError::Exhausted` once no more candles are available.
pub trait CandleFeed {
    fn next_candle(&mut self) -> Result<Candle, MarketError>;
}

pub trait CandlePort {
    /// Opens a feed for `operand_key` yielding candles opened at or after `start_ts`.
    fn open_feed(
        &self,
        operand_key: &str,
        start_ts: i64,
    ) -> Result<Box<dyn CandleFeed>, MarketError>;
}

/// A feed over candles already loaded into memory.
#[derive(Debug, Default)]
pub struct VecCandleFeed {
    candles: VecDeque<Candle>,
}

impl VecCandleFeed {
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self {
            candles: candles.into(),
        }
    }
}

impl CandleFeed for VecCandleFeed {
    fn next_candle(&mut self) -> Result<Candle, MarketError> {
        self.candles
            .pop_front()
            .ok_or(MarketError::Exhausted { last_tick: None })
    }
}
