//! Batch repository
//!
//! State machine over the `batches` table, keyed by (source prefix, batch id):
//!
//! ```text
//! (none) --append--> open --append--> open
//!                    open --lock----> locked --close--> closed | error
//!                                     locked --unlock-> open | error
//!                                     error  --unlock-> open
//! ```
//!
//! `append` and `lock` read before they write, so they run in a SERIALIZABLE
//! transaction; two appenders racing to create the first row, or two loaders
//! racing to lock, leave exactly one winner and give everyone else
//! `ConditionCheckFailed`. The remaining transitions are single conditional
//! `UPDATE`s and need no isolation escalation.
//!
//! `last_update` never moves backward: every write stores
//! `GREATEST(last_update, $timestamp)`, so a caller with a lagging clock
//! cannot rewind it.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::{begin_serializable, finish};
use crate::error::{EngineError, EngineResult};
use crate::models::{Batch, BatchStatus};
use crate::validation::{validate_batch_key, validate_file_ref};

const BATCH_COLUMNS: &str = "source_prefix, batch_id, entries, status, last_update, \
                             cluster_load_status, cluster_load_statements, error_message";

/// Add `file_ref` to the open batch, creating the batch on first use
///
/// Re-appending a file already in the batch leaves the entries unchanged and
/// only advances `last_update`. Returns the batch entries after the append.
///
/// # Errors
///
/// - `ConditionCheckFailed` if the batch exists but is no longer open, or a
///   concurrent appender won a race on the same key. Re-read the prefix
///   configuration (the current batch has probably rotated) and retry.
/// - `MalformedInput` for missing or oversized identifiers.
#[tracing::instrument(skip(pool, timestamp), fields(source_prefix = %source_prefix, batch_id = %batch_id))]
pub async fn append(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
    file_ref: &str,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    validate_batch_key(source_prefix, batch_id)?;
    validate_file_ref(file_ref)?;

    let mut tx = begin_serializable(pool).await?;
    let result = append_in(&mut tx, source_prefix, batch_id, file_ref, timestamp).await;
    let entries = finish(tx, result).await?;

    tracing::debug!(file_ref = %file_ref, entries = entries.len(), "File appended to batch");
    Ok(entries)
}

async fn append_in(
    conn: &mut PgConnection,
    source_prefix: &str,
    batch_id: &str,
    file_ref: &str,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM batches WHERE source_prefix = $1 AND batch_id = $2",
    )
    .bind(source_prefix)
    .bind(batch_id)
    .fetch_optional(&mut *conn)
    .await?;

    match status {
        None => {
            let entries: Vec<String> = sqlx::query_scalar(
                r#"
                INSERT INTO batches (source_prefix, batch_id, entries, last_update, status)
                VALUES ($1, $2, ARRAY[$3]::TEXT[], $4, 'open')
                RETURNING entries
                "#,
            )
            .bind(source_prefix)
            .bind(batch_id)
            .bind(file_ref)
            .bind(timestamp)
            .fetch_one(&mut *conn)
            .await?;

            tracing::info!("Batch created");
            Ok(entries)
        },
        Some(status) if status != BatchStatus::Open.as_str() => {
            Err(EngineError::condition_check_failed(format!(
                "batch '{}' for prefix '{}' is {}, not open",
                batch_id, source_prefix, status
            )))
        },
        Some(_) => {
            let entries: Option<Vec<String>> = sqlx::query_scalar(
                r#"
                UPDATE batches
                SET entries = CASE
                        WHEN $3 = ANY(entries) THEN entries
                        ELSE array_append(entries, $3)
                    END,
                    last_update = GREATEST(last_update, $4)
                WHERE source_prefix = $1 AND batch_id = $2 AND status = 'open'
                RETURNING entries
                "#,
            )
            .bind(source_prefix)
            .bind(batch_id)
            .bind(file_ref)
            .bind(timestamp)
            .fetch_optional(&mut *conn)
            .await?;

            entries.ok_or_else(|| {
                EngineError::condition_check_failed(format!(
                    "batch '{}' for prefix '{}' stopped being open",
                    batch_id, source_prefix
                ))
            })
        },
    }
}

/// Claim an open batch for loading
///
/// Exactly one of any number of concurrent callers succeeds and receives the
/// batch entries; every other caller gets `ConditionCheckFailed`, which is the
/// expected outcome for a loader that lost the race.
#[tracing::instrument(skip(pool, timestamp), fields(source_prefix = %source_prefix, batch_id = %batch_id))]
pub async fn lock(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    validate_batch_key(source_prefix, batch_id)?;

    let mut tx = begin_serializable(pool).await?;
    let result = lock_in(&mut tx, source_prefix, batch_id, timestamp).await;

    match finish(tx, result).await {
        Ok(entries) => {
            tracing::info!(entries = entries.len(), "Batch locked");
            Ok(entries)
        },
        Err(err @ EngineError::ConditionCheckFailed { .. }) => {
            tracing::info!(reason = %err, "Batch not locked; already claimed or not open");
            Err(err)
        },
        Err(err) => Err(err),
    }
}

async fn lock_in(
    conn: &mut PgConnection,
    source_prefix: &str,
    batch_id: &str,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<String>> {
    let entries: Option<Vec<String>> = sqlx::query_scalar(
        r#"
        UPDATE batches
        SET status = 'locked',
            last_update = GREATEST(last_update, $3)
        WHERE source_prefix = $1 AND batch_id = $2 AND status = 'open'
        RETURNING entries
        "#,
    )
    .bind(source_prefix)
    .bind(batch_id)
    .bind(timestamp)
    .fetch_optional(&mut *conn)
    .await?;

    entries.ok_or_else(|| {
        EngineError::condition_check_failed(format!(
            "batch '{}' for prefix '{}' is missing or not open",
            batch_id, source_prefix
        ))
    })
}

/// Abandon a load: move a locked or errored batch back to `new_status`
///
/// `new_status` must be `open` or `error`. Calling this on an open or closed
/// batch fails with `ConditionCheckFailed`; it is never a silent no-op.
#[tracing::instrument(skip(pool, timestamp), fields(source_prefix = %source_prefix, batch_id = %batch_id, new_status = %new_status))]
pub async fn unlock(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
    timestamp: DateTime<Utc>,
    new_status: BatchStatus,
) -> EngineResult<()> {
    validate_batch_key(source_prefix, batch_id)?;
    if !matches!(new_status, BatchStatus::Open | BatchStatus::Error) {
        return Err(EngineError::malformed(format!(
            "unlock can only move a batch to open or error, not {}",
            new_status
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE batches
        SET status = $3,
            last_update = GREATEST(last_update, $4)
        WHERE source_prefix = $1 AND batch_id = $2 AND status = ANY($5)
        "#,
    )
    .bind(source_prefix)
    .bind(batch_id)
    .bind(new_status.as_str())
    .bind(timestamp)
    .bind(BatchStatus::unlockable())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::condition_check_failed(format!(
            "batch '{}' for prefix '{}' is missing or not locked/error",
            batch_id, source_prefix
        )));
    }

    tracing::info!("Batch unlocked");
    Ok(())
}

/// Finish a load with `closed` or `error`
///
/// Allowed only from `locked`, or as a repeat of a close that already set the
/// same final status; repeating a close is harmless and keeps the first error
/// message. Closing an open batch (never locked) or overwriting a different
/// final status fails with `ConditionCheckFailed`.
///
/// `error_message` belongs to the `error` status only; passing one with
/// `closed` is `MalformedInput`.
#[tracing::instrument(skip(pool, timestamp, error_message), fields(source_prefix = %source_prefix, batch_id = %batch_id, final_status = %final_status))]
pub async fn close(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
    timestamp: DateTime<Utc>,
    final_status: BatchStatus,
    error_message: Option<&str>,
) -> EngineResult<()> {
    validate_batch_key(source_prefix, batch_id)?;
    if !final_status.is_final() {
        return Err(EngineError::malformed(format!(
            "close requires closed or error, not {}",
            final_status
        )));
    }
    if final_status == BatchStatus::Closed && error_message.is_some() {
        return Err(EngineError::malformed(
            "an error message can only be recorded with status error",
        ));
    }

    // Leaving `locked` replaces any message from an earlier load attempt.
    let result = sqlx::query(
        r#"
        UPDATE batches
        SET status = $3,
            error_message = CASE
                    WHEN status = $3 THEN COALESCE(error_message, $5)
                    ELSE $5
                END,
            last_update = GREATEST(last_update, $4)
        WHERE source_prefix = $1 AND batch_id = $2
          AND (status = 'locked' OR status = $3)
        "#,
    )
    .bind(source_prefix)
    .bind(batch_id)
    .bind(final_status.as_str())
    .bind(timestamp)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::condition_check_failed(format!(
            "batch '{}' for prefix '{}' is missing or not locked",
            batch_id, source_prefix
        )));
    }

    match final_status {
        BatchStatus::Error => tracing::warn!(error_message = ?error_message, "Batch closed with error"),
        _ => tracing::info!("Batch closed"),
    }
    Ok(())
}

/// Record load progress reported by the load executor
#[tracing::instrument(skip(pool, timestamp, cluster_load_statements), fields(source_prefix = %source_prefix, batch_id = %batch_id))]
pub async fn change_load_state(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
    timestamp: DateTime<Utc>,
    cluster_load_status: &str,
    cluster_load_statements: &str,
) -> EngineResult<()> {
    validate_batch_key(source_prefix, batch_id)?;

    let result = sqlx::query(
        r#"
        UPDATE batches
        SET cluster_load_status = $3,
            cluster_load_statements = $4,
            last_update = GREATEST(last_update, $5)
        WHERE source_prefix = $1 AND batch_id = $2
        "#,
    )
    .bind(source_prefix)
    .bind(batch_id)
    .bind(cluster_load_status)
    .bind(cluster_load_statements)
    .bind(timestamp)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::condition_check_failed(format!(
            "batch '{}' for prefix '{}' does not exist",
            batch_id, source_prefix
        )));
    }

    tracing::debug!(cluster_load_status = %cluster_load_status, "Load state recorded");
    Ok(())
}

pub async fn get_batch(
    pool: &PgPool,
    source_prefix: &str,
    batch_id: &str,
) -> EngineResult<Option<Batch>> {
    validate_batch_key(source_prefix, batch_id)?;

    let batch = sqlx::query_as::<_, Batch>(&format!(
        "SELECT {} FROM batches WHERE source_prefix = $1 AND batch_id = $2",
        BATCH_COLUMNS
    ))
    .bind(source_prefix)
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    Ok(batch)
}

/// Batches in `status`, optionally only those updated at or after `since`,
/// oldest first
pub async fn get_batches(
    pool: &PgPool,
    status: BatchStatus,
    since: Option<DateTime<Utc>>,
) -> EngineResult<Vec<Batch>> {
    let batches = sqlx::query_as::<_, Batch>(&format!(
        r#"
        SELECT {}
        FROM batches
        WHERE status = $1
          AND ($2::TIMESTAMPTZ IS NULL OR last_update >= $2)
        ORDER BY last_update, source_prefix, batch_id
        "#,
        BATCH_COLUMNS
    ))
    .bind(status.as_str())
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(batches)
}
