//! Rotation policy
//!
//! Decides whether a prefix's current batch should be rotated. The decision
//! is pure; the rotation trigger calls [`evaluate`] on freshly read state and,
//! on [`RotationDecision::Rotate`], calls `db::prefix_config::rotate` with
//! [`new_batch_id`] and then locks the previous batch.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Batch, BatchStatus, PrefixConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The batch holds at least `batch_size` entries
    BatchFull,
    /// The batch is older than `batch_timeout_secs`
    BatchTimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    Keep,
    Rotate(RotationReason),
}

impl RotationDecision {
    pub fn should_rotate(&self) -> bool {
        matches!(self, RotationDecision::Rotate(_))
    }
}

/// Evaluate the size and age thresholds for the current batch
///
/// A missing, empty or no-longer-open batch is never rotated. A zero
/// threshold disables that check. Age is measured from the last rotation, or
/// from the batch's `last_update` when the prefix has never rotated.
pub fn evaluate(config: &PrefixConfig, batch: Option<&Batch>, now: DateTime<Utc>) -> RotationDecision {
    let Some(batch) = batch else {
        return RotationDecision::Keep;
    };
    if batch.entries.is_empty() || batch.status != BatchStatus::Open {
        return RotationDecision::Keep;
    }

    if config.batch_size > 0 && batch.entries.len() >= config.batch_size as usize {
        return RotationDecision::Rotate(RotationReason::BatchFull);
    }

    if config.batch_timeout_secs > 0 {
        let anchor = config.last_batch_rotation.unwrap_or(batch.last_update);
        if now - anchor >= Duration::seconds(i64::from(config.batch_timeout_secs)) {
            return RotationDecision::Rotate(RotationReason::BatchTimedOut);
        }
    }

    RotationDecision::Keep
}

/// Fresh batch id for a rotation
pub fn new_batch_id() -> String {
    Uuid::new_v4().to_string()
}
