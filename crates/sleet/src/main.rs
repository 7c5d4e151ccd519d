//! Sleet CLI: micro-batch loader that upserts NDJSON event files into a
//! relational table.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sleet::{CliArgs, Config, init_tracing, run_pipeline, shutdown_signal};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.log_format);

    info!("Loading config from {}", args.config.display());

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Pipeline: {} ({} -> {})",
        config.pipeline, config.source.path, config.sink.table
    );

    if args.dry_run {
        info!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    match run_pipeline(&config, args.once, shutdown).await {
        Ok(stats) => {
            info!(
                batches_committed = stats.batches_committed,
                rows_applied = stats.rows_applied,
                "Shutdown complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}
