//! Pipeline driver.
//!
//! Each tick moves through discovery, validation, apply and checkpoint in
//! that order. A failed apply or checkpoint write routes straight back to
//! idle without touching the checkpoint, so the same files come back on the
//! next tick. A checkpoint that cannot be loaded skips discovery and is
//! retried on the next tick. Nothing here stops the loop.

mod processor;
mod stats;

pub use stats::{PipelineStats, TickOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sleet_core::emit;
use sleet_core::metrics::events::{
    BatchApplyDuration, BatchCompleted, BatchStatus, IngestionLag, RecordsRead, RecordsRejected,
    RowsUpserted,
};
use sleet_core::polling::run_polling_loop;
use sleet_core::storage::StorageProvider;

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::Config;
use crate::error::{
    AddressParseSnafu, CheckpointSnafu, MetricsSnafu, PipelineError, ReaderError,
    RejectLogSnafu, SinkSnafu, StorageSnafu,
};
use crate::event::{Batch, RawBatch};
use crate::rejects::RejectLog;
use crate::sink::{EventSink, build_sink};
use crate::source::FileSource;
use crate::transform::{RejectKind, process_records};

/// Start the metrics endpoint if enabled, then run the pipeline described
/// by `config` until `shutdown` is cancelled. With `once`, run a single tick
/// instead.
pub async fn run_pipeline(
    config: &Config,
    once: bool,
    shutdown: CancellationToken,
) -> Result<PipelineStats, PipelineError> {
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        sleet_core::init_metrics(addr).context(MetricsSnafu)?;
        info!(address = %addr, "Metrics endpoint enabled");
    }

    let mut pipeline = Pipeline::from_config(config).await?;

    if once {
        let outcome = pipeline.tick().await;
        pipeline.close().await;
        info!(target = %pipeline.name(), outcome = ?outcome, "Single tick finished");
    } else {
        pipeline
            .run(config.source.trigger_interval(), shutdown)
            .await?;
    }

    Ok(pipeline.stats().clone())
}

/// The micro-batch upsert pipeline.
pub struct Pipeline {
    /// Identifier used in logging and metrics.
    name: String,
    source: FileSource,
    checkpoint: Box<dyn CheckpointStore>,
    sink: Box<dyn EventSink>,
    rejects: Option<RejectLog>,
    /// False until `ensure_table` succeeded, when table setup is enabled.
    table_ready: bool,
    started: bool,
    next_batch_id: u64,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        name: String,
        source: FileSource,
        checkpoint: Box<dyn CheckpointStore>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            source,
            checkpoint,
            sink,
            rejects: None,
            table_ready: true,
            started: false,
            next_batch_id: 1,
            stats: PipelineStats::default(),
        }
    }

    /// Write each committed batch's rejects to `log`.
    pub fn with_reject_log(mut self, log: RejectLog) -> Self {
        self.rejects = Some(log);
        self
    }

    /// Create the target table before the first apply.
    pub fn with_table_setup(mut self, create_table: bool) -> Self {
        self.table_ready = !create_table;
        self
    }

    /// Build a pipeline from configuration. Does not touch the database.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let source_storage = StorageProvider::for_path(&config.source.path)
            .await
            .context(StorageSnafu)?;
        let checkpoint_storage = StorageProvider::for_path(&config.checkpoint.path)
            .await
            .context(StorageSnafu)?;

        let source = FileSource::new(
            Arc::new(source_storage),
            config.source.clone(),
            config.pipeline.clone(),
        );
        let checkpoint =
            FileCheckpointStore::new(Arc::new(checkpoint_storage), config.pipeline.clone());
        let sink = build_sink(&config.sink).await.context(SinkSnafu)?;
        let rejects = RejectLog::from_config(&config.error_handling)
            .await
            .context(RejectLogSnafu)?;

        let mut pipeline = Self::new(config.pipeline.clone(), source, Box::new(checkpoint), sink)
            .with_table_setup(config.sink.create_table);
        if let Some(log) = rejects {
            pipeline = pipeline.with_reject_log(log);
        }
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn checkpoint(&self) -> &dyn CheckpointStore {
        self.checkpoint.as_ref()
    }

    /// Load the checkpoint. Once it has loaded, later calls do nothing; after
    /// a failure the next call tries again.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if self.started {
            return Ok(());
        }

        if self.checkpoint.load().await.context(CheckpointSnafu)? {
            info!(
                target = %self.name,
                committed_files = self.checkpoint.committed().len(),
                last_batch_id = self.checkpoint.last_batch_id(),
                "Resuming from checkpoint"
            );
        } else {
            info!(target = %self.name, "Cold start - beginning fresh processing");
        }

        self.next_batch_id = self.checkpoint.last_batch_id() + 1;
        self.started = true;
        Ok(())
    }

    /// Run one full tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = if let Err(e) = self.start().await {
            self.checkpoint_unavailable(&e)
        } else {
            match self.discover().await {
                Ok(Some(raw)) => self.process_batch(raw).await,
                Ok(None) => TickOutcome::Idle,
                Err(e) => self.discovery_failed(&e),
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    /// Run ticks every `interval` until `shutdown` is cancelled, then close
    /// the sink.
    pub async fn run(
        &mut self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<(), PipelineError> {
        info!(
            target = %self.name,
            trigger_interval_secs = interval.as_secs(),
            "Pipeline started"
        );

        let name = self.name.clone();
        let result = run_polling_loop(self, interval, shutdown, &name).await;
        self.close().await;
        result
    }

    /// Release the sink connection and log totals.
    pub async fn close(&mut self) {
        self.sink.close().await;
        let stats = &self.stats;
        info!(
            target = %self.name,
            ticks = stats.ticks,
            batches_committed = stats.batches_committed,
            batches_failed = stats.batches_failed,
            files_committed = stats.files_committed,
            rows_applied = stats.rows_applied,
            records_rejected = stats.records_rejected,
            "Pipeline stopped"
        );
    }

    async fn discover(&mut self) -> Result<Option<RawBatch>, ReaderError> {
        self.source.next_batch(self.checkpoint.committed()).await
    }

    fn checkpoint_unavailable(&self, e: &PipelineError) -> TickOutcome {
        error!(
            target = %self.name,
            error = %e,
            "Failed to load checkpoint, discovery skipped"
        );
        TickOutcome::CheckpointUnavailable
    }

    fn discovery_failed(&self, e: &ReaderError) -> TickOutcome {
        error!(target = %self.name, error = %e, "Discovery failed");
        TickOutcome::DiscoveryFailed
    }

    /// Validate, apply and checkpoint one batch of raw records.
    async fn process_batch(&mut self, raw: RawBatch) -> TickOutcome {
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;

        let RawBatch {
            files,
            records,
            mut rejects,
            lines_read,
            pending_after,
        } = raw;

        emit!(RecordsRead {
            count: lines_read,
            target: self.name.clone(),
        });

        let (events, dropped) = process_records(records, Utc::now());
        rejects.extend(dropped);
        let batch = Batch {
            batch_id,
            files,
            events,
            rejects,
            lines_read,
        };

        self.report_rejects(&batch);
        info!(
            target = %self.name,
            batch_id,
            files = batch.files.len(),
            events = batch.events.len(),
            rejects = batch.rejects.len(),
            pending = pending_after,
            "Formed batch"
        );

        let files = batch.files.len();

        if !self.table_ready {
            if let Err(e) = self.sink.ensure_table().await {
                error!(target = %self.name, batch_id, error = %e, "Failed to create target table");
                self.batch_completed(BatchStatus::SinkFailed);
                return TickOutcome::SinkFailed { batch_id, files };
            }
            self.table_ready = true;
        }

        let apply_start = Instant::now();
        let rows = match self.sink.apply(&batch.events).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    target = %self.name,
                    batch_id,
                    error = %e,
                    "Sink failed, files will be retried"
                );
                self.batch_completed(BatchStatus::SinkFailed);
                return TickOutcome::SinkFailed { batch_id, files };
            }
        };
        emit!(BatchApplyDuration {
            duration: apply_start.elapsed(),
            target: self.name.clone(),
        });
        emit!(RowsUpserted {
            count: rows,
            target: self.name.clone(),
        });

        if let Err(e) = self.checkpoint.mark_committed(&batch.files, batch_id).await {
            error!(
                target = %self.name,
                batch_id,
                error = %e,
                "Checkpoint failed, files will be re-applied"
            );
            self.batch_completed(BatchStatus::CheckpointFailed);
            return TickOutcome::CheckpointFailed { batch_id, files };
        }
        self.batch_completed(BatchStatus::Committed);

        if let Some(lag) = batch.max_ingestion_lag() {
            emit!(IngestionLag {
                lag,
                target: self.name.clone(),
            });
        }

        if let Some(log) = &self.rejects
            && let Err(e) = log.write_batch(batch_id, &batch.rejects).await
        {
            warn!(target = %self.name, batch_id, error = %e, "Failed to write reject log");
        }

        info!(
            target = %self.name,
            batch_id,
            files,
            rows,
            "Committed batch"
        );

        TickOutcome::Committed {
            batch_id,
            files,
            rows,
            rejects: batch.rejects.len(),
        }
    }

    fn report_rejects(&self, batch: &Batch) {
        if batch.rejects.is_empty() {
            return;
        }

        let mut by_kind: HashMap<RejectKind, u64> = HashMap::new();
        for rejected in &batch.rejects {
            *by_kind.entry(rejected.kind()).or_default() += 1;
        }
        for (kind, count) in &by_kind {
            emit!(RecordsRejected {
                count: *count,
                kind: kind.as_str(),
                target: self.name.clone(),
            });
        }

        info!(
            target = %self.name,
            batch_id = batch.batch_id,
            parse = by_kind.get(&RejectKind::Parse).copied().unwrap_or(0),
            validation = by_kind.get(&RejectKind::Validation).copied().unwrap_or(0),
            cast = by_kind.get(&RejectKind::Cast).copied().unwrap_or(0),
            "Dropped rejected records"
        );
    }

    fn batch_completed(&self, status: BatchStatus) {
        emit!(BatchCompleted {
            status,
            target: self.name.clone(),
        });
    }
}
