//! Tick iterator over a candle feed.
//!
//! Each candle is decomposed into four ticks (see [`Candle::to_ticks`]) that
//! are buffered and drained before the next candle is requested. Ticks before
//! `start_ts` are skipped and the first tick after `now_ts` ends the stream.
//! Once exhausted the iterator keeps reporting the last tick it produced.

use crate::domain::candle::{Candle, Tick};
use crate::domain::error::MarketError;
use crate::ports::candle_port::CandleFeed;
use std::collections::VecDeque;
use tracing::debug;

pub struct TickIterator {
    operand_key: String,
    feed: Box<dyn CandleFeed>,
    interval_secs: i64,
    start_ts: i64,
    now_ts: i64,
    buffer: VecDeque<Tick>,
    last_tick: Option<Tick>,
    exhausted: bool,
}

impl TickIterator {
    pub fn new(
        operand_key: &str,
        feed: Box<dyn CandleFeed>,
        interval_secs: i64,
        start_ts: i64,
        now_ts: i64,
    ) -> Self {
        Self {
            operand_key: operand_key.to_string(),
            feed,
            interval_secs,
            start_ts,
            now_ts,
            buffer: VecDeque::with_capacity(4),
            last_tick: None,
            exhausted: false,
        }
    }

    pub fn operand_key(&self) -> &str {
        &self.operand_key
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next tick in strictly increasing timestamp order.
    ///
    /// Non-exhaustion feed errors are returned as-is and leave the iterator
    /// usable; exhaustion is sticky. A candle with a non-finite price is
    /// reported as an upstream error and never turned into ticks.
    pub fn next_tick(&mut self) -> Result<Tick, MarketError> {
        loop {
            if self.exhausted {
                return Err(MarketError::Exhausted {
                    last_tick: self.last_tick,
                });
            }
            match self.buffer.pop_front() {
                Some(tick) if tick.timestamp > self.now_ts => self.exhaust(),
                Some(tick) if tick.timestamp < self.start_ts => continue,
                Some(tick) if self.is_repeat(tick) => continue,
                Some(tick) => {
                    self.last_tick = Some(tick);
                    return Ok(tick);
                }
                None => match self.feed.next_candle() {
                    Ok(candle) if !candle.has_finite_prices() => {
                        return Err(MarketError::Upstream {
                            operand: self.operand_key.clone(),
                            reason: format!(
                                "candle at {} has a non-finite price",
                                candle.timestamp
                            ),
                        });
                    }
                    Ok(candle) => self.push_candle(&candle),
                    Err(e) if e.is_exhausted() => self.exhaust(),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    fn is_repeat(&self, tick: Tick) -> bool {
        self.last_tick
            .is_some_and(|last| tick.timestamp <= last.timestamp)
    }

    fn push_candle(&mut self, candle: &Candle) {
        self.buffer.extend(candle.to_ticks(self.interval_secs));
    }

    fn exhaust(&mut self) {
        debug!("Tick stream {} exhausted, last tick {:?}", self.operand_key, self.last_tick);
        self.exhausted = true;
        self.buffer.clear();
    }
}
