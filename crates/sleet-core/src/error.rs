//! Errors raised by the shared infrastructure.
//!
//! The loader crate wraps these in its own pipeline errors; nothing here
//! knows about events, sinks or checkpoints.

use std::path::PathBuf;

use snafu::prelude::*;

/// Failure while reading, listing or writing objects under a storage root.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// The configured location is not a local path.
    #[snafu(display("Not a local storage location: {location}"))]
    InvalidLocation { location: String },

    #[snafu(display("Object store request failed: {source}"))]
    ObjectStore { source: object_store::Error },

    #[snafu(display("Filesystem error: {source}"))]
    Io { source: std::io::Error },
}

impl StorageError {
    /// True when the object or directory does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ObjectStore {
                source: object_store::Error::NotFound { .. },
            } => true,
            Self::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// A configuration file that could not be loaded or does not validate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("source.path must not be empty"))]
    EmptySourcePath,

    #[snafu(display("checkpoint.path must not be empty"))]
    EmptyCheckpointPath,

    #[snafu(display("sink.table must not be empty"))]
    EmptyTableName,

    /// An output directory inside `source.path`. Its files would be listed
    /// as input.
    #[snafu(display("{field} '{path}' must not be inside source.path"))]
    InsideSourcePath { field: &'static str, path: String },

    /// A count or interval that has to be at least one.
    #[snafu(display("'{field}' must be greater than zero"))]
    ZeroValue { field: &'static str },

    /// One or more `${VAR}` references could not be resolved.
    #[snafu(display("Unresolved environment variables in config:\n{message}"))]
    EnvInterpolation { message: String },

    #[snafu(display("Invalid YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Cannot read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Only `.yaml` and `.yml` files are accepted.
    #[snafu(display("{} is not a YAML file", path.display()))]
    UnsupportedFormat { path: PathBuf },
}

/// Prometheus recorder setup failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    #[snafu(display("Could not build Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// A recorder was already installed in this process.
    #[snafu(display("Metrics recorder is already installed"))]
    AlreadyInitialized,

    #[snafu(display("Metrics recorder has not been installed"))]
    NotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_counts_as_not_found() {
        let err = StorageError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_not_found());

        let err = StorageError::Io {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_bad_location_is_not_a_missing_object() {
        let err = StorageError::InvalidLocation {
            location: "s3://bucket".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_zero_value_names_the_field() {
        let err = ConfigError::ZeroValue {
            field: "source.max_files_per_trigger",
        };
        assert_eq!(
            err.to_string(),
            "'source.max_files_per_trigger' must be greater than zero"
        );
    }
}
