//! Batchload Engine
//!
//! Batch coordination for file-arrival driven bulk loading.
//!
//! # Overview
//!
//! Notification handlers run concurrently and independently. Each one appends
//! the arriving file to the currently open batch of its source prefix. A
//! rotation trigger moves the prefix to a fresh batch id, and a load trigger
//! locks the previous batch, loads it, and closes it. All coordination happens
//! in PostgreSQL:
//!
//! - **Batch Repository** ([`db::batches`]): append, lock, unlock, close,
//!   load-state changes and lookups
//! - **Processed-File Ledger** ([`db::processed_files`]): at-most-once
//!   bookkeeping per file under at-least-once delivery
//! - **Prefix Configuration Store** ([`db::prefix_config`]): per-source
//!   settings and the current-batch pointer
//! - **Conflict Classifier** ([`db::conflict`]): one retry signal,
//!   [`EngineError::ConditionCheckFailed`], for every race shape
//!
//! The engine never retries. A `ConditionCheckFailed` means "re-read the
//! configuration and decide"; the current batch id may have rotated.
//!
//! # Example
//!
//! ```no_run
//! use batchload_engine::{config::EngineConfig, db, EngineError};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::load()?;
//!     let _log_guard = batchload_common::logging::init_logging(&config.logging)?;
//!     let pool = db::create_pool(&config.database).await?;
//!
//!     let prefix = "my-bucket/incoming";
//!     let Some(settings) = db::prefix_config::get_config(&pool, prefix).await? else {
//!         anyhow::bail!("no configuration for {}", prefix);
//!     };
//!
//!     let now = batchload_common::time::now();
//!     match db::batches::append(&pool, prefix, &settings.current_batch, "data/part-0001.csv", now).await {
//!         Ok(entries) => tracing::info!(count = entries.len(), "file batched"),
//!         Err(EngineError::ConditionCheckFailed { .. }) => {
//!             // batch rotated or raced; re-read configuration and retry
//!         },
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rotation;
pub mod validation;

pub use error::{EngineError, EngineResult};
pub use models::{Batch, BatchStatus, LoadCluster, PrefixConfig, ProcessedFile};
