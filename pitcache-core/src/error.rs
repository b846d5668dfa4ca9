//! Error taxonomy for historical caches and recursive engines.
//!
//! Absence of data is never an error: navigation and lookups return `Option`.
//! The variants here are reserved for broken invariants, caller mistakes and
//! configuration loading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A cache invariant no longer holds. Never retried internally.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
