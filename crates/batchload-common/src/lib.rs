//! Batchload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient utilities shared by the batchload workspace members:
//!
//! - **Logging**: tracing subscriber setup driven by `BATCHLOAD_LOG_*` environment variables
//! - **Time**: conversions between `DateTime<Utc>` and the epoch-seconds
//!   representation used by loader tooling
//!
//! # Example
//!
//! ```no_run
//! use batchload_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("loader started");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod time;
