//! Store error classification
//!
//! Every race the engine can lose surfaces from PostgreSQL as one of a few
//! SQLSTATE codes. They all collapse into [`EngineError::ConditionCheckFailed`]
//! so callers have a single retry signal:
//!
//! | SQLSTATE | Meaning                   | Typical race                          |
//! |----------|---------------------------|---------------------------------------|
//! | `23505`  | unique_violation          | two appenders create the same batch   |
//! | `40001`  | serialization_failure     | two loaders lock the same batch       |
//! | `40P01`  | deadlock_detected         | crossing updates under contention     |
//!
//! Connection-level failures become [`EngineError::StoreUnavailable`];
//! everything else stays [`EngineError::Database`].

use sqlx::Error as SqlxError;

use crate::error::EngineError;

pub const UNIQUE_VIOLATION: &str = "23505";
pub const SERIALIZATION_FAILURE: &str = "40001";
pub const DEADLOCK_DETECTED: &str = "40P01";

/// Race shapes recognised by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    UniqueViolation,
    SerializationFailure,
    Deadlock,
}

impl ConflictKind {
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            UNIQUE_VIOLATION => Some(Self::UniqueViolation),
            SERIALIZATION_FAILURE => Some(Self::SerializationFailure),
            DEADLOCK_DETECTED => Some(Self::Deadlock),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UniqueViolation => "unique violation",
            Self::SerializationFailure => "serialization failure",
            Self::Deadlock => "deadlock",
        }
    }
}

/// Class 08 (connection exception) and the 57P0x shutdown codes
pub fn is_connection_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Conflict kind carried by a database error, if any
pub fn conflict_kind(error: &SqlxError) -> Option<ConflictKind> {
    if let SqlxError::Database(db_err) = error {
        if db_err.is_unique_violation() {
            return Some(ConflictKind::UniqueViolation);
        }
        return db_err.code().and_then(|code| ConflictKind::from_sqlstate(&code));
    }
    None
}

/// Whether the error means the store itself could not be used
pub fn is_unavailable(error: &SqlxError) -> bool {
    match error {
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::Protocol(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => true,
        SqlxError::Database(db_err) => db_err
            .code()
            .map(|code| is_connection_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// Translate a store error into the engine's error taxonomy
pub fn classify(error: SqlxError) -> EngineError {
    if let Some(kind) = conflict_kind(&error) {
        tracing::debug!(conflict = kind.as_str(), error = %error, "Store conflict");
        return EngineError::condition_check_failed(format!("{}: {}", kind.as_str(), error));
    }

    if is_unavailable(&error) {
        return EngineError::StoreUnavailable(error);
    }

    EngineError::Database(error)
}
