//! Configuration helpers shared by sleet binaries.

mod cli;
mod vars;

pub use cli::CliArgs;
pub use vars::interpolate;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics` and `/health`.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    crate::metrics::DEFAULT_METRICS_ADDR.to_string()
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Interpolate environment variables into YAML text and deserialize it.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let text = interpolate(contents).map_err(|problems| ConfigError::EnvInterpolation {
        message: problems.join("\n"),
    })?;
    serde_yaml::from_str(&text).context(YamlParseSnafu)
}

/// Load a YAML config file from disk.
pub fn load_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        metrics: MetricsConfig,
    }

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("sleet.yaml")));
        assert!(is_yaml_file(Path::new("sleet.yml")));
        assert!(!is_yaml_file(Path::new("sleet.toml")));
        assert!(!is_yaml_file(Path::new("README")));
    }

    #[test]
    fn test_parse_yaml_with_defaults() {
        let sample: Sample = parse_yaml("name: events\n").unwrap();
        assert_eq!(sample.name, "events");
        assert!(!sample.metrics.enabled);
        assert_eq!(sample.metrics.address, "0.0.0.0:9090");
    }

    #[test]
    fn test_load_rejects_non_yaml_extension() {
        let err = load_yaml_file::<Sample>(Path::new("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_yaml_file::<Sample>(Path::new("/nonexistent/sleet.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_metrics_config_rejects_unknown_fields() {
        let result: Result<MetricsConfig, _> = serde_yaml::from_str("enabled: true\nport: 1\n");
        assert!(result.is_err());
    }
}
