//! verdict: evaluates market price predictions against candle data.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], process entry in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
