//! Engine error types

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by every repository operation
#[derive(Error, Debug)]
pub enum EngineError {
    /// An optimistic precondition ("batch must be open", "row must not exist")
    /// did not hold because a concurrent actor got there first. Re-read and
    /// decide whether to retry.
    #[error("Condition check failed: {reason}")]
    ConditionCheckFailed { reason: String },

    /// The store could not be reached or the connection broke mid-flight
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    /// Missing or malformed identifiers; retrying will not help
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn condition_check_failed(reason: impl Into<String>) -> Self {
        Self::ConditionCheckFailed {
            reason: reason.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    pub fn is_condition_check_failed(&self) -> bool {
        matches!(self, Self::ConditionCheckFailed { .. })
    }

    /// Whether the caller's retry policy may attempt the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConditionCheckFailed { .. } | Self::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        crate::db::conflict::classify(error)
    }
}
