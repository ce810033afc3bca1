//! Relational store client
//!
//! Pool construction, migrations and transaction boundaries. Repository
//! operations that must decide based on what they read (append, lock) run
//! inside [`begin_serializable`] and always end through [`finish`], which
//! commits on success and rolls back explicitly on failure.

pub mod batches;
pub mod conflict;
pub mod prefix_config;
pub mod processed_files;

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{EngineError, EngineResult};

pub async fn create_pool(config: &DatabaseConfig) -> EngineResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the schema under `migrations/`
pub async fn run_migrations(pool: &PgPool) -> EngineResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(migration_error)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Store failures while applying a migration are classified like any other
/// query; everything else is a problem with the migration set itself
fn migration_error(error: MigrateError) -> EngineError {
    match error {
        MigrateError::Execute(source) => conflict::classify(source),
        other => EngineError::Config(format!("Failed to run migrations: {}", other)),
    }
}

pub async fn health_check(pool: &PgPool) -> EngineResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(EngineError::from)
}

/// Open a transaction running at SERIALIZABLE isolation
pub async fn begin_serializable(pool: &PgPool) -> EngineResult<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;

    // Must be the first statement of the transaction.
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// Commit when `result` is `Ok`, roll back otherwise
///
/// Serialization failures detected at commit time are classified like any
/// other store error, so they surface as `ConditionCheckFailed`.
pub async fn finish<T>(
    tx: Transaction<'static, Postgres>,
    result: EngineResult<T>,
) -> EngineResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        },
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(err)
        },
    }
}
