//! Unified error model for the row-literal reader.
//! Parse-shaped failures are recoverable (they trigger a rollback and a strategy
//! fallback); everything else is terminal for the row or the session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValuesError {
    /// Malformed literal, malformed expression, wrong delimiter, unmatched
    /// parenthesis. Recoverable: roll back to the column mark and fall through
    /// to the next strategy.
    #[error("syntax error: {message}")]
    Syntax { message: String },

    /// A numeric literal out of range for its declared type. Detected during
    /// literal deserialization but deliberately not recoverable: re-reading the
    /// same text as an expression would re-raise the same problem.
    #[error("numeric value out of range: {message}")]
    Overflow { message: String },

    /// Evaluated NULL where the target forbids it and no default-coercion is
    /// configured.
    #[error("cannot insert NULL into non-nullable column of type {kind}")]
    NullNotAllowed { kind: String },

    /// Value shape does not fit the declared column type (including fixed-width
    /// list arity mismatches).
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// Expression evaluation was required but disabled by configuration.
    #[error("interpreting expressions is disabled")]
    ExpressionsDisabled,

    /// Data found after the statement terminator.
    #[error("cannot read data after semicolon")]
    TrailingData,

    #[error("io error: {message}")]
    Io { message: String },

    /// Defect in the reader itself, not a data problem.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// A recoverable error with the failing row ordinal attached for
    /// diagnostics, produced when fallback options are exhausted.
    #[error("{source} at row {row}")]
    AtRow {
        row: u64,
        #[source]
        source: Box<ValuesError>,
    },
}

pub type ValuesResult<T> = Result<T, ValuesError>;

impl ValuesError {
    pub fn syntax<S: Into<String>>(msg: S) -> Self {
        ValuesError::Syntax { message: msg.into() }
    }

    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        ValuesError::Overflow { message: msg.into() }
    }

    pub fn type_mismatch<S: Into<String>>(msg: S) -> Self {
        ValuesError::TypeMismatch { message: msg.into() }
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ValuesError::Internal { message: msg.into() }
    }

    /// Whether a rollback-and-retry with the next parsing strategy can help.
    /// Only syntax-shaped failures qualify; numeric-domain errors in particular
    /// do not, even though they surface inside the literal deserializer.
    pub fn is_recoverable_parse(&self) -> bool {
        matches!(self, ValuesError::Syntax { .. })
    }

    /// Attach the row ordinal to a recoverable error that became terminal.
    /// Terminal errors keep their own identity.
    pub fn at_row(self, row: u64) -> Self {
        match self {
            ValuesError::AtRow { .. } => self,
            other => ValuesError::AtRow { row, source: Box::new(other) },
        }
    }
}

impl From<std::io::Error> for ValuesError {
    fn from(err: std::io::Error) -> Self {
        ValuesError::Io { message: err.to_string() }
    }
}
