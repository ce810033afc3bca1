//! Processed-file ledger
//!
//! One row per file ever seen, independent of whether its batch still
//! exists. Notification delivery is at-least-once; recording the file first
//! and treating a duplicate insert as "already seen" turns that into
//! effectively-once batching.

use sqlx::PgPool;

use crate::error::{EngineError, EngineResult};
use crate::models::ProcessedFile;
use crate::validation::{validate_batch_id, validate_file_ref};

/// Record a newly arrived file, not yet assigned to a batch
///
/// # Errors
///
/// `ConditionCheckFailed` when the file is already recorded; the caller
/// should drop the notification as a replay.
#[tracing::instrument(skip(pool))]
pub async fn put_file_entry(pool: &PgPool, load_file: &str) -> EngineResult<()> {
    validate_file_ref(load_file)?;

    sqlx::query("INSERT INTO processed_files (load_file) VALUES ($1)")
        .bind(load_file)
        .execute(pool)
        .await
        .map_err(|e| match EngineError::from(e) {
            EngineError::ConditionCheckFailed { .. } => EngineError::condition_check_failed(
                format!("file '{}' is already recorded", load_file),
            ),
            other => other,
        })?;

    tracing::debug!("File recorded");
    Ok(())
}

/// Assign a recorded file to a batch
///
/// A file keeps one batch id for its lifetime: linking succeeds when the file
/// is unassigned or already linked to `batch_id`, and fails with
/// `ConditionCheckFailed` when it is unknown or belongs to another batch.
#[tracing::instrument(skip(pool))]
pub async fn link_file_to_batch(pool: &PgPool, load_file: &str, batch_id: &str) -> EngineResult<()> {
    validate_file_ref(load_file)?;
    validate_batch_id(batch_id)?;

    let result = sqlx::query(
        r#"
        UPDATE processed_files
        SET batch_id = $2
        WHERE load_file = $1 AND (batch_id IS NULL OR batch_id = $2)
        "#,
    )
    .bind(load_file)
    .bind(batch_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::condition_check_failed(format!(
            "file '{}' is unknown or linked to another batch",
            load_file
        )));
    }

    Ok(())
}

pub async fn get_file(pool: &PgPool, load_file: &str) -> EngineResult<Option<ProcessedFile>> {
    validate_file_ref(load_file)?;

    let file = sqlx::query_as::<_, ProcessedFile>(
        "SELECT load_file, batch_id FROM processed_files WHERE load_file = $1",
    )
    .bind(load_file)
    .fetch_optional(pool)
    .await?;

    Ok(file)
}

/// Remove a ledger entry so the file can be processed again
///
/// Returns whether an entry was removed.
#[tracing::instrument(skip(pool))]
pub async fn delete_file(pool: &PgPool, load_file: &str) -> EngineResult<bool> {
    validate_file_ref(load_file)?;

    let result = sqlx::query("DELETE FROM processed_files WHERE load_file = $1")
        .bind(load_file)
        .execute(pool)
        .await?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        tracing::info!("File entry deleted");
    }
    Ok(deleted)
}
