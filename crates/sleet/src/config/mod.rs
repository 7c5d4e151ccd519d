//! Configuration for the sleet pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
pub use sleet_core::config::{MetricsConfig, interpolate};

/// Configuration for the input directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Directory that event files land in.
    pub path: String,
    /// Maximum number of files folded into one micro-batch.
    #[serde(default = "default_max_files_per_trigger")]
    pub max_files_per_trigger: usize,
    /// Seconds between trigger ticks.
    #[serde(default = "default_trigger_interval")]
    pub trigger_interval_secs: u64,
    /// Maximum files read concurrently within one batch.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// File name suffixes that mark an input file.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

fn default_max_files_per_trigger() -> usize {
    10
}

fn default_trigger_interval() -> u64 {
    5
}

fn default_max_concurrent_files() -> usize {
    4
}

fn default_suffixes() -> Vec<String> {
    vec![".jsonl".into(), ".json".into(), ".ndjson".into()]
}

impl SourceConfig {
    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_secs)
    }
}

/// Where the committed-file checkpoint lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Directory holding `{pipeline}_checkpoint.json`.
    pub path: String,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default = "default_pg_password")]
    pub password: String,
    #[serde(default = "default_pg_database")]
    pub database: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_user() -> String {
    "postgres".to_string()
}

fn default_pg_password() -> String {
    "password".to_string()
}

fn default_pg_database() -> String {
    "ecommerce_db".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_pg_host(),
            port: default_pg_port(),
            user: default_pg_user(),
            password: default_pg_password(),
            database: default_pg_database(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// SQLite database file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    /// Database file, created if missing.
    pub path: String,
}

/// Target database backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Postgres(PostgresConfig::default())
    }
}

/// Configuration for the upsert sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Target table name.
    #[serde(default = "default_table")]
    pub table: String,
    /// Issue `CREATE TABLE IF NOT EXISTS` before the first apply.
    #[serde(default = "default_create_table")]
    pub create_table: bool,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_table() -> String {
    "ecommerce_events".to_string()
}

fn default_create_table() -> bool {
    true
}

/// Error handling configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorHandlingConfig {
    /// Directory for per-batch reject files. Disabled when unset.
    #[serde(default)]
    pub reject_path: Option<String>,
}

/// Main configuration for sleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Pipeline name used in logs, metrics and the checkpoint file name.
    #[serde(default = "default_pipeline")]
    pub pipeline: String,
    pub source: SourceConfig,
    pub checkpoint: CheckpointConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

fn default_pipeline() -> String {
    "ecommerce".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = sleet_core::config::load_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = sleet_core::config::parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.path.trim().is_empty() {
            return Err(ConfigError::EmptySourcePath);
        }
        if self.checkpoint.path.trim().is_empty() {
            return Err(ConfigError::EmptyCheckpointPath);
        }
        if self.sink.table.trim().is_empty() {
            return Err(ConfigError::EmptyTableName);
        }

        let outputs = [
            ("checkpoint.path", Some(&self.checkpoint.path)),
            ("error_handling.reject_path", self.error_handling.reject_path.as_ref()),
        ];
        for (field, path) in outputs {
            if let Some(path) = path
                && is_within(path, &self.source.path)
            {
                return Err(ConfigError::InsideSourcePath {
                    field,
                    path: path.clone(),
                });
            }
        }

        let positive = [
            ("max_files_per_trigger", self.source.max_files_per_trigger as u64),
            ("trigger_interval_secs", self.source.trigger_interval_secs),
            ("max_concurrent_files", self.source.max_concurrent_files as u64),
        ];
        if let Some((field, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue { field });
        }

        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn normalize(path: &str) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// True when `path` is `dir` or lies below it. Symlinks are not followed.
fn is_within(path: &str, dir: &str) -> bool {
    normalize(path).starts_with(normalize(dir))
}
