//! Domain error types.

use crate::domain::candle::Tick;

/// A parse error with position information for boolean-expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Errors raised while turning author text into a prediction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("condition '{name}': unknown operator '{operator}'")]
    UnknownOperator { name: String, operator: String },

    #[error("condition '{name}': expected {expected} operands, found {found}")]
    OperandCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("condition '{name}': invalid operand '{operand}': {reason}")]
    InvalidOperand {
        name: String,
        operand: String,
        reason: String,
    },

    #[error("condition '{name}': {reason}")]
    InvalidCondition { name: String, reason: String },

    #[error("condition '{name}': invalid time: {reason}")]
    InvalidTime { name: String, reason: String },

    #[error("condition '{name}': error margin ratio {ratio} outside [0, {max}]")]
    ErrorMarginOutOfRange { name: String, ratio: f64, max: f64 },

    #[error("duplicate condition name '{0}'")]
    DuplicateCondition(String),

    #[error("invalid postedAt: {0}")]
    InvalidPostedAt(String),

    #[error("predict clause is required")]
    MissingPredict,

    #[error("clause '{clause}': {source}")]
    Clause {
        clause: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid prediction input: {0}")]
    InvalidInput(String),
}

/// Tick ingestion errors. Condition state is never mutated when one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition '{name}': no ticks supplied")]
    NoTicksSupplied { name: String },

    #[error("condition '{name}': ticks carry mismatched timestamps")]
    MismatchedTimestamps { name: String },

    #[error("condition '{name}': missing tick for operand {operand}")]
    MissingOperandTick { name: String, operand: String },

    #[error("condition '{name}': tick at {timestamp} is older than last seen {last_ts}")]
    StaleTimestamp {
        name: String,
        timestamp: i64,
        last_ts: i64,
    },
}

/// Market data errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("operand {0} has no market stream")]
    UnsupportedOperand(String),

    #[error("provider {provider} is not supported (operand {operand})")]
    UnsupportedProvider { provider: String, operand: String },

    #[error("stream exhausted")]
    Exhausted { last_tick: Option<Tick> },

    #[error("upstream error for {operand}: {reason}")]
    Upstream { operand: String, reason: String },
}

impl MarketError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, MarketError::Exhausted { .. })
    }
}

/// A failure that stopped one prediction's runner. Other predictions in the
/// batch are unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("prediction {id}: {source}")]
    Market {
        id: String,
        #[source]
        source: MarketError,
    },

    #[error("prediction {id}: {source}")]
    Condition {
        id: String,
        #[source]
        source: ConditionError,
    },
}

impl RunError {
    pub fn prediction_id(&self) -> &str {
        match self {
            RunError::Market { id, .. } | RunError::Condition { id, .. } => id,
        }
    }
}

/// Top-level error type for verdict.
#[derive(Debug, thiserror::Error)]
pub enum VerdictError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("no prediction with id '{id}'")]
    UnknownPrediction { id: String },

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&VerdictError> for std::process::ExitCode {
    fn from(err: &VerdictError) -> Self {
        let code: u8 = match err {
            VerdictError::Io(_) => 1,
            VerdictError::ConfigParse { .. }
            | VerdictError::ConfigMissing { .. }
            | VerdictError::ConfigInvalid { .. } => 2,
            VerdictError::Database { .. } | VerdictError::DatabaseQuery { .. } => 3,
            VerdictError::Compile(_) | VerdictError::UnknownPrediction { .. } => 4,
            VerdictError::Market(_) => 5,
            VerdictError::Serialization { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
