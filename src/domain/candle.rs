//! OHLC candles and the ticks derived from them.

use serde::{Deserialize, Serialize};

/// A single (timestamp, price) observation. Timestamps are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    pub value: f64,
}

impl Tick {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Shortest interval whose four ticks land on distinct seconds inside the
/// candle.
pub const MIN_CANDLE_INTERVAL_SECS: i64 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Opening time of the candle, unix seconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Whether open, high, low and close are all finite numbers.
    pub fn has_finite_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Decomposes the candle into four ticks spread across `interval_secs`.
    ///
    /// A bullish candle is assumed to visit its low before its high, a bearish
    /// one its high before its low, so both extremes are observed in a
    /// plausible order. Offsets are 0, 1/4, 1/2 and 3/4 of the interval.
    /// Below [`MIN_CANDLE_INTERVAL_SECS`] they spill into the next candle's
    /// seconds, which is why configuration rejects such intervals.
    pub fn to_ticks(&self, interval_secs: i64) -> [Tick; 4] {
        let (first, second) = if self.is_bullish() {
            (self.low, self.high)
        } else {
            (self.high, self.low)
        };
        let step = (interval_secs / 4).max(1);
        [
            Tick::new(self.timestamp, self.open),
            Tick::new(self.timestamp + step, first),
            Tick::new(self.timestamp + 2 * step, second),
            Tick::new(self.timestamp + 3 * step, self.close),
        ]
    }
}
