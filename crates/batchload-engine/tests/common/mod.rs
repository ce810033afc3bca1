//! Shared harness for engine integration tests
//!
//! Every test gets its own PostgreSQL container with the schema applied, so
//! tests never share batch or ledger state.
//!
//! ```no_run
//! mod common;
//! use common::TestPostgres;
//!
//! #[tokio::test]
//! async fn test_something() -> anyhow::Result<()> {
//!     skip_if_no_docker!();
//!     let pg = TestPostgres::start().await?;
//!     batchload_engine::db::health_check(pg.pool()).await?;
//!     Ok(())
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration as StdDuration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

use batchload_engine::PrefixConfig;

/// PostgreSQL container with the engine schema applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        Self::start_with_options(PostgresOptions::default()).await
    }

    pub async fn start_with_options(options: PostgresOptions) -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag(&options.version)
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(StdDuration::from_secs(options.acquire_timeout_secs))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        if options.run_migrations {
            batchload_engine::db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
        }

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

pub struct PostgresOptions {
    /// PostgreSQL image tag (default: "16-alpine")
    pub version: String,
    /// Pool size (default: 5)
    pub max_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: u64,
    /// Apply the schema on startup (default: true)
    pub run_migrations: bool,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            version: "16-alpine".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

impl PostgresOptions {
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Fixed base instant so tests can reason about ordering
pub fn t0() -> DateTime<Utc> {
    batchload_common::time::from_epoch_seconds(1_431_648_000.0).unwrap_or_else(Utc::now)
}

/// `t0` shifted by `secs` seconds
pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// Store a minimal configuration for `prefix` pointing at `current_batch`
pub async fn configure_prefix(pool: &PgPool, prefix: &str, current_batch: &str) -> Result<PrefixConfig> {
    let config = PrefixConfig::new(prefix, current_batch, 100, 300);
    batchload_engine::db::prefix_config::put_config(pool, &config).await?;
    Ok(config)
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,batchload_engine=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Whether a Docker daemon is reachable
pub fn is_docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Return early from a test when Docker is not available
#[macro_export]
macro_rules! skip_if_no_docker {
    () => {
        if !$crate::common::is_docker_available() {
            eprintln!("Skipping test: Docker is not available");
            return Ok(());
        }
    };
}
