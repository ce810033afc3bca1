//! Processed-file ledger
//!
//! Requires Docker; every test returns early when it is not available.

#[macro_use]
mod common;

use anyhow::Result;
use batchload_engine::db::{batches, processed_files};
use batchload_engine::{EngineError, ProcessedFile};
use common::{at, init_test_tracing, TestPostgres};

#[ctor::ctor]
fn init() {
    init_test_tracing();
}

#[tokio::test]
async fn test_put_file_entry_reports_duplicates() -> Result<()> {
    skip_if_no_docker!();
    let pg = TestPostgres::start().await?;
    let pool = pg.pool();

    processed_files::put_file_entry(pool, "bucket/in/a.csv").await?;
    let duplicate = processed_files::put_file_entry(pool, "bucket/in/a.csv").await;
    assert!(matches!(
        duplicate,
        Err(EngineError::ConditionCheckFailed { .. })
    ));

    let file = processed_files::get_file(pool, "bucket/in/a.csv").await?;
    assert_eq!(
        file,
        Some(ProcessedFile {
            load_file: "bucket/in/a.csv".to_string(),
            batch_id: None,
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_link_keeps_one_batch_for_life() -> Result<()> {
    skip_if_no_docker!();
    let pg = TestPostgres::start().await?;
    let pool = pg.pool();

    processed_files::put_file_entry(pool, "a.csv").await?;
    processed_files::link_file_to_batch(pool, "a.csv", "b1").await?;
    // relinking to the same batch is harmless
    processed_files::link_file_to_batch(pool, "a.csv", "b1").await?;

    let moved = processed_files::link_file_to_batch(pool, "a.csv", "b2").await;
    assert!(moved.unwrap_err().is_condition_check_failed());

    let unknown = processed_files::link_file_to_batch(pool, "never-seen.csv", "b1").await;
    assert!(unknown.unwrap_err().is_condition_check_failed());

    let file = processed_files::get_file(pool, "a.csv").await?.expect("recorded");
    assert_eq!(file.batch_id.as_deref(), Some("b1"));
    Ok(())
}

#[tokio::test]
async fn test_ledger_outlives_batches() -> Result<()> {
    skip_if_no_docker!();
    let pg = TestPostgres::start().await?;
    let pool = pg.pool();

    processed_files::put_file_entry(pool, "a.csv").await?;
    batches::append(pool, "bucket/in", "b1", "a.csv", at(0)).await?;
    processed_files::link_file_to_batch(pool, "a.csv", "b1").await?;

    sqlx::query("DELETE FROM batches").execute(pool).await?;

    let file = processed_files::get_file(pool, "a.csv").await?.expect("still recorded");
    assert_eq!(file.batch_id.as_deref(), Some("b1"));
    Ok(())
}

#[tokio::test]
async fn test_delete_allows_reprocessing() -> Result<()> {
    skip_if_no_docker!();
    let pg = TestPostgres::start().await?;
    let pool = pg.pool();

    assert!(!processed_files::delete_file(pool, "a.csv").await?);

    processed_files::put_file_entry(pool, "a.csv").await?;
    assert!(processed_files::delete_file(pool, "a.csv").await?);
    assert!(processed_files::get_file(pool, "a.csv").await?.is_none());

    processed_files::put_file_entry(pool, "a.csv").await?;
    Ok(())
}

#[tokio::test]
async fn test_oversized_file_ref_is_malformed() -> Result<()> {
    skip_if_no_docker!();
    let pg = TestPostgres::start().await?;

    let result = processed_files::put_file_entry(pg.pool(), &"f".repeat(301)).await;
    assert!(matches!(result, Err(EngineError::MalformedInput(_))));
    Ok(())
}
