//! Tick outcomes and running totals.

use sleet_core::polling::IterationResult;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No uncommitted files.
    Idle,
    /// Rows applied and files checkpointed.
    Committed {
        batch_id: u64,
        files: usize,
        rows: u64,
        rejects: usize,
    },
    /// The sink failed; the files stay pending.
    SinkFailed { batch_id: u64, files: usize },
    /// Rows were applied but the checkpoint write failed; the files stay
    /// pending and are re-applied next tick.
    CheckpointFailed { batch_id: u64, files: usize },
    /// Listing the input failed.
    DiscoveryFailed,
    /// The checkpoint could not be loaded, so nothing was discovered.
    CheckpointUnavailable,
}

impl TickOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TickOutcome::Committed { .. })
    }

    pub(crate) fn iteration_result(&self) -> IterationResult {
        match self {
            TickOutcome::Idle => IterationResult::NoItems,
            TickOutcome::Committed { .. } => IterationResult::ProcessedItems,
            TickOutcome::SinkFailed { .. }
            | TickOutcome::CheckpointFailed { .. }
            | TickOutcome::DiscoveryFailed
            | TickOutcome::CheckpointUnavailable => IterationResult::Failed,
        }
    }
}

/// Totals since the pipeline started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub files_committed: u64,
    pub rows_applied: u64,
    pub records_rejected: u64,
}

impl PipelineStats {
    pub fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Idle => self.idle_ticks += 1,
            TickOutcome::Committed {
                files,
                rows,
                rejects,
                ..
            } => {
                self.batches_committed += 1;
                self.files_committed += *files as u64;
                self.rows_applied += rows;
                self.records_rejected += *rejects as u64;
            }
            TickOutcome::SinkFailed { .. } | TickOutcome::CheckpointFailed { .. } => {
                self.batches_failed += 1
            }
            TickOutcome::DiscoveryFailed | TickOutcome::CheckpointUnavailable => {}
        }
    }
}
