//! Core domain types and logic.

pub mod trilean;
pub mod operand;
pub mod candle;
pub mod condition;
pub mod bool_expr;
pub mod expr_parser;
pub mod predict;
pub mod prediction;
pub mod prediction_type;
pub mod compiler;
pub mod tick_stream;
pub mod market;
pub mod runner;
pub mod config_validation;
pub mod error;
