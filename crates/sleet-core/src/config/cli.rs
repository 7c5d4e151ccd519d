//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::tracing::LogFormat;

#[derive(Parser, Debug)]
#[command(version, about = "Micro-batch NDJSON to relational upsert pipeline")]
pub struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Run a single trigger tick and exit
    #[arg(long)]
    pub once: bool,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = CliArgs::try_parse_from(["sleet", "--config", "sleet.yaml"]).unwrap();
        assert_eq!(args.config, PathBuf::from("sleet.yaml"));
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(!args.once);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "sleet",
            "-c",
            "sleet.yaml",
            "--log-format",
            "json",
            "--once",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(args.once);
        assert!(args.dry_run);
    }

    #[test]
    fn test_config_is_required() {
        assert!(CliArgs::try_parse_from(["sleet"]).is_err());
    }
}
