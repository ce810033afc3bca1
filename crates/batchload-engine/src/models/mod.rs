//! Persisted entities
//!
//! Value objects passed to and from the repositories. They are never cached;
//! the store is the only owner of batch, ledger and configuration state.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use crate::error::{EngineError, EngineResult};
use crate::validation::{
    validate_batch_id, validate_optional, validate_source_prefix, MAX_COPY_OPTIONS_LENGTH,
    MAX_FILENAME_FILTER_LENGTH, MAX_SETTING_LENGTH, MAX_VERSION_LENGTH,
};

/// Lifecycle state of a batch
///
/// `open --lock--> locked --close--> closed | error`, with `unlock` as the
/// recovery path from `locked` or `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Open,
    Locked,
    Closed,
    Error,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 4] = [
        BatchStatus::Open,
        BatchStatus::Locked,
        BatchStatus::Closed,
        BatchStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "open",
            BatchStatus::Locked => "locked",
            BatchStatus::Closed => "closed",
            BatchStatus::Error => "error",
        }
    }

    /// Statuses a `close` may finish a batch with
    pub fn is_final(&self) -> bool {
        matches!(self, BatchStatus::Closed | BatchStatus::Error)
    }

    /// Statuses `unlock` may move a batch away from
    pub fn is_unlockable(&self) -> bool {
        matches!(self, BatchStatus::Locked | BatchStatus::Error)
    }

    /// Column values of every status `unlock` may move a batch away from
    pub fn unlockable() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| status.is_unlockable())
            .map(BatchStatus::as_str)
            .collect()
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(BatchStatus::Open),
            "locked" => Ok(BatchStatus::Locked),
            "closed" => Ok(BatchStatus::Closed),
            "error" => Ok(BatchStatus::Error),
            other => Err(EngineError::malformed(format!("unknown batch status '{}'", other))),
        }
    }
}

/// Accumulation of file references destined for one load
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Batch {
    pub source_prefix: String,
    pub batch_id: String,
    pub entries: Vec<String>,
    #[sqlx(try_from = "String")]
    pub status: BatchStatus,
    pub last_update: DateTime<Utc>,
    pub cluster_load_status: Option<String>,
    pub cluster_load_statements: Option<String>,
    pub error_message: Option<String>,
}

impl TryFrom<String> for BatchStatus {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, EngineError> {
        value.parse()
    }
}

impl Batch {
    pub fn contains(&self, file_ref: &str) -> bool {
        self.entries.iter().any(|entry| entry == file_ref)
    }

    /// Operator-facing one-line view of the batch
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            source_prefix: self.source_prefix.clone(),
            batch_id: self.batch_id.clone(),
            status: self.status,
            entry_count: self.entries.len(),
            last_update: batchload_common::time::readable(self.last_update),
        }
    }
}

/// Row of a batch listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub source_prefix: String,
    pub batch_id: String,
    pub status: BatchStatus,
    pub entry_count: usize,
    pub last_update: String,
}

/// Idempotency record for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProcessedFile {
    pub load_file: String,
    pub batch_id: Option<String>,
}

/// Connection and load settings for one target cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCluster {
    pub cluster_endpoint: String,
    pub cluster_port: u16,
    pub connect_user: String,
    /// Already encrypted by the configuring tool; stored opaque
    pub connect_password: String,
    pub target_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_columns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_load_statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_load_statement: Option<String>,
}

impl LoadCluster {
    pub fn validate(&self) -> EngineResult<()> {
        for (value, field) in [
            (&self.cluster_endpoint, "cluster endpoint"),
            (&self.connect_user, "connect user"),
            (&self.target_table, "target table"),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::malformed(format!("{} is required", field)));
            }
        }
        if self.cluster_port == 0 {
            return Err(EngineError::malformed("cluster port must be greater than 0"));
        }
        Ok(())
    }
}

/// Per-source-prefix ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrefixConfig {
    pub source_prefix: String,
    /// Number of files that fills a batch
    pub batch_size: i32,
    /// Age in seconds after which a batch is loaded regardless of size
    pub batch_timeout_secs: i32,
    pub copy_options: Option<String>,
    /// Batch id new appends target
    pub current_batch: String,
    pub last_update: Option<DateTime<Utc>>,
    pub last_batch_rotation: Option<DateTime<Utc>>,
    pub filename_filter_regex: Option<String>,
    pub load_clusters: Json<Vec<LoadCluster>>,
    pub mount_dir: Option<String>,
    pub success_topic: Option<String>,
    pub failure_topic: Option<String>,
    pub version: Option<String>,
}

impl PrefixConfig {
    /// Minimal configuration for a prefix; optional settings start empty
    pub fn new(
        source_prefix: impl Into<String>,
        current_batch: impl Into<String>,
        batch_size: i32,
        batch_timeout_secs: i32,
    ) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            batch_size,
            batch_timeout_secs,
            copy_options: None,
            current_batch: current_batch.into(),
            last_update: None,
            last_batch_rotation: None,
            filename_filter_regex: None,
            load_clusters: Json(Vec::new()),
            mount_dir: None,
            success_topic: None,
            failure_topic: None,
            version: None,
        }
    }

    pub fn load_clusters(&self) -> &[LoadCluster] {
        &self.load_clusters.0
    }

    /// Check identifiers, thresholds, the filename filter and every cluster
    pub fn validate(&self) -> EngineResult<()> {
        validate_source_prefix(&self.source_prefix)?;
        validate_batch_id(&self.current_batch)?;

        if self.batch_size < 0 {
            return Err(EngineError::malformed("batch size cannot be negative"));
        }
        if self.batch_timeout_secs < 0 {
            return Err(EngineError::malformed("batch timeout cannot be negative"));
        }

        for (value, field, max_length) in [
            (&self.copy_options, "copy options", MAX_COPY_OPTIONS_LENGTH),
            (&self.filename_filter_regex, "filename filter", MAX_FILENAME_FILTER_LENGTH),
            (&self.mount_dir, "mount directory", MAX_SETTING_LENGTH),
            (&self.success_topic, "success topic", MAX_SETTING_LENGTH),
            (&self.failure_topic, "failure topic", MAX_SETTING_LENGTH),
            (&self.version, "version", MAX_VERSION_LENGTH),
        ] {
            validate_optional(value.as_deref(), field, max_length)?;
        }

        self.filename_filter()?;
        self.load_clusters().iter().try_for_each(LoadCluster::validate)
    }

    fn filename_filter(&self) -> EngineResult<Option<Regex>> {
        match self.filename_filter_regex.as_deref() {
            None | Some("") => Ok(None),
            Some(pattern) => Regex::new(pattern).map(Some).map_err(|e| {
                EngineError::malformed(format!(
                    "invalid filename filter '{}' for prefix '{}': {}",
                    pattern, self.source_prefix, e
                ))
            }),
        }
    }

    /// Whether a file name passes the configured filename filter
    ///
    /// No filter accepts every file.
    pub fn accepts_file(&self, file_name: &str) -> EngineResult<bool> {
        Ok(self
            .filename_filter()?
            .map_or(true, |regex| regex.is_match(file_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cluster() -> LoadCluster {
        LoadCluster {
            cluster_endpoint: "vertica.internal".to_string(),
            cluster_port: 5433,
            connect_user: "loader".to_string(),
            connect_password: "AQICAHh...".to_string(),
            target_table: "events".to_string(),
            copy_columns: None,
            pre_load_statement: Some("TRUNCATE staging".to_string()),
            post_load_statement: None,
        }
    }

    #[test]
    fn test_status_parsing() {
        for status in BatchStatus::ALL {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
        assert!(matches!(
            "pending".parse::<BatchStatus>(),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_status_from_column_value() {
        assert_eq!(
            BatchStatus::try_from("locked".to_string()).unwrap(),
            BatchStatus::Locked
        );
        assert!(matches!(
            BatchStatus::try_from("LOCKED".to_string()),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_status_groups() {
        assert!(BatchStatus::Closed.is_final());
        assert!(BatchStatus::Error.is_final());
        assert!(!BatchStatus::Locked.is_final());
        assert!(BatchStatus::Locked.is_unlockable());
        assert!(BatchStatus::Error.is_unlockable());
        assert!(!BatchStatus::Open.is_unlockable());
        assert!(!BatchStatus::Closed.is_unlockable());
        assert_eq!(BatchStatus::unlockable(), vec!["locked", "error"]);
    }

    #[test]
    fn test_load_cluster_json_shape() {
        let json = serde_json::to_value(cluster()).unwrap();
        assert_eq!(json["clusterEndpoint"], "vertica.internal");
        assert_eq!(json["clusterPort"], 5433);
        assert_eq!(json["preLoadStatement"], "TRUNCATE staging");
        assert!(json.get("copyColumns").is_none());
    }

    #[test]
    fn test_filename_filter() {
        let mut config = PrefixConfig::new("bucket/in", "b1", 100, 300);
        assert!(config.accepts_file("anything.bin").unwrap());

        config.filename_filter_regex = Some(r".*\.csv$".to_string());
        assert!(config.accepts_file("part-0001.csv").unwrap());
        assert!(!config.accepts_file("part-0001.json").unwrap());

        config.filename_filter_regex = Some("(unclosed".to_string());
        assert!(matches!(
            config.accepts_file("part-0001.csv"),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PrefixConfig::new("bucket/in", "b1", 100, 300);
        config.load_clusters = Json(vec![cluster()]);
        assert!(config.validate().is_ok());

        config.batch_size = -1;
        assert!(config.validate().is_err());
        config.batch_size = 100;

        config.current_batch = String::new();
        assert!(config.validate().is_err());
        config.current_batch = "b1".to_string();

        let mut broken = cluster();
        broken.target_table = " ".to_string();
        config.load_clusters = Json(vec![broken]);
        assert!(matches!(
            config.validate(),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_config_settings_fit_their_columns() {
        let oversized: [(fn(&mut PrefixConfig, String), usize); 6] = [
            (|c, v| c.copy_options = Some(v), 200),
            (|c, v| c.filename_filter_regex = Some(v), 100),
            (|c, v| c.mount_dir = Some(v), 100),
            (|c, v| c.success_topic = Some(v), 100),
            (|c, v| c.failure_topic = Some(v), 100),
            (|c, v| c.version = Some(v), 20),
        ];

        for (set, max_length) in oversized {
            let mut config = PrefixConfig::new("bucket/in", "b1", 10, 10);
            set(&mut config, "x".repeat(max_length));
            assert!(config.validate().is_ok());

            set(&mut config, "x".repeat(max_length + 1));
            assert!(matches!(
                config.validate(),
                Err(EngineError::MalformedInput(_))
            ));
        }
    }

    #[test]
    fn test_load_cluster_port_required() {
        let mut cluster = cluster();
        cluster.cluster_port = 0;
        assert!(cluster.validate().is_err());
    }

    #[test]
    fn test_batch_summary() {
        let batch = Batch {
            source_prefix: "bucket/in".to_string(),
            batch_id: "b1".to_string(),
            entries: vec!["a.csv".to_string(), "b.csv".to_string()],
            status: BatchStatus::Locked,
            last_update: Utc.with_ymd_and_hms(2015, 5, 3, 7, 4, 9).unwrap(),
            cluster_load_status: None,
            cluster_load_statements: None,
            error_message: None,
        };

        assert!(batch.contains("a.csv"));
        assert!(!batch.contains("c.csv"));

        let summary = batch.summary();
        assert_eq!(summary.entry_count, 2);
        assert_eq!(summary.status, BatchStatus::Locked);
        assert_eq!(summary.last_update, "2015-05-03-07:04:09");
    }
}
