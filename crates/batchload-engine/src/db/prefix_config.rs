//! Prefix configuration repository
//!
//! One row per source prefix. `current_batch` is the batch id that new
//! appends target; rotating it is a plain overwrite (last writer wins), and
//! appenders still holding the old id find out through `append` failing with
//! `ConditionCheckFailed` once that batch is locked.

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};

use crate::error::{EngineError, EngineResult};
use crate::models::{LoadCluster, PrefixConfig};
use crate::validation::{validate_batch_id, validate_source_prefix};

const CONFIG_COLUMNS: &str = "source_prefix, batch_size, batch_timeout_secs, copy_options, \
                              current_batch, last_update, last_batch_rotation, \
                              filename_filter_regex, load_clusters, mount_dir, success_topic, \
                              failure_topic, version";

/// Create the configuration for a new prefix
///
/// # Errors
///
/// `ConditionCheckFailed` if the prefix is already configured, `MalformedInput`
/// if the configuration does not validate.
#[tracing::instrument(skip(pool, config), fields(source_prefix = %config.source_prefix))]
pub async fn put_config(pool: &PgPool, config: &PrefixConfig) -> EngineResult<()> {
    config.validate()?;

    sqlx::query(
        r#"
        INSERT INTO prefix_config (
            source_prefix, batch_size, batch_timeout_secs, copy_options, current_batch,
            last_update, last_batch_rotation, filename_filter_regex, load_clusters,
            mount_dir, success_topic, failure_topic, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&config.source_prefix)
    .bind(config.batch_size)
    .bind(config.batch_timeout_secs)
    .bind(&config.copy_options)
    .bind(&config.current_batch)
    .bind(config.last_update)
    .bind(config.last_batch_rotation)
    .bind(&config.filename_filter_regex)
    .bind(&config.load_clusters)
    .bind(&config.mount_dir)
    .bind(&config.success_topic)
    .bind(&config.failure_topic)
    .bind(&config.version)
    .execute(pool)
    .await
    .map_err(|e| match EngineError::from(e) {
        EngineError::ConditionCheckFailed { .. } => EngineError::condition_check_failed(format!(
            "prefix '{}' is already configured",
            config.source_prefix
        )),
        other => other,
    })?;

    tracing::info!(
        current_batch = %config.current_batch,
        batch_size = config.batch_size,
        batch_timeout_secs = config.batch_timeout_secs,
        clusters = config.load_clusters().len(),
        "Prefix configured"
    );
    Ok(())
}

pub async fn get_config(pool: &PgPool, source_prefix: &str) -> EngineResult<Option<PrefixConfig>> {
    validate_source_prefix(source_prefix)?;

    let config = sqlx::query_as::<_, PrefixConfig>(&format!(
        "SELECT {} FROM prefix_config WHERE source_prefix = $1",
        CONFIG_COLUMNS
    ))
    .bind(source_prefix)
    .fetch_optional(pool)
    .await?;

    Ok(config)
}

/// Point the prefix at a new current batch
///
/// Overwrites `current_batch` and `last_batch_rotation` unconditionally and
/// returns the batch id that was current before, which is the batch the
/// caller should go on to lock.
///
/// # Errors
///
/// `ConditionCheckFailed` if the prefix is not configured.
#[tracing::instrument(skip(pool, timestamp))]
pub async fn rotate(
    pool: &PgPool,
    source_prefix: &str,
    new_batch_id: &str,
    timestamp: DateTime<Utc>,
) -> EngineResult<String> {
    validate_source_prefix(source_prefix)?;
    validate_batch_id(new_batch_id)?;

    let previous: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE prefix_config AS cfg
        SET current_batch = $2,
            last_batch_rotation = $3
        FROM (
            SELECT current_batch
            FROM prefix_config
            WHERE source_prefix = $1
            FOR UPDATE
        ) AS previous
        WHERE cfg.source_prefix = $1
        RETURNING previous.current_batch
        "#,
    )
    .bind(source_prefix)
    .bind(new_batch_id)
    .bind(timestamp)
    .fetch_optional(pool)
    .await?;

    let previous = previous.ok_or_else(|| {
        EngineError::condition_check_failed(format!(
            "prefix '{}' is not configured",
            source_prefix
        ))
    })?;

    tracing::info!(previous_batch = %previous, "Current batch rotated");
    Ok(previous)
}

/// Append a load target to the prefix
///
/// Returns the full cluster list after the append.
#[tracing::instrument(skip(pool, cluster, timestamp), fields(cluster_endpoint = %cluster.cluster_endpoint, target_table = %cluster.target_table))]
pub async fn add_load_cluster(
    pool: &PgPool,
    source_prefix: &str,
    cluster: &LoadCluster,
    timestamp: DateTime<Utc>,
) -> EngineResult<Vec<LoadCluster>> {
    validate_source_prefix(source_prefix)?;
    cluster.validate()?;

    let clusters: Option<Json<Vec<LoadCluster>>> = sqlx::query_scalar(
        r#"
        UPDATE prefix_config
        SET load_clusters = load_clusters || jsonb_build_array($2::JSONB),
            last_update = GREATEST(COALESCE(last_update, $3), $3)
        WHERE source_prefix = $1
        RETURNING load_clusters
        "#,
    )
    .bind(source_prefix)
    .bind(Json(cluster))
    .bind(timestamp)
    .fetch_optional(pool)
    .await?;

    let Json(clusters) = clusters.ok_or_else(|| {
        EngineError::condition_check_failed(format!(
            "prefix '{}' is not configured",
            source_prefix
        ))
    })?;

    tracing::info!(clusters = clusters.len(), "Load cluster added");
    Ok(clusters)
}
