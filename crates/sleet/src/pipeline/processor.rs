//! Trigger loop integration.
//!
//! Checkpoint loading and discovery happen in `prepare`, which the loop may
//! abandon on shutdown. Apply and checkpoint writes happen in `process`,
//! which always completes.

use async_trait::async_trait;

use sleet_core::polling::{IterationResult, PollingProcessor};

use super::{Pipeline, TickOutcome};
use crate::error::PipelineError;
use crate::event::RawBatch;

/// Work found by discovery.
pub enum Discovered {
    Batch(RawBatch),
    Failed,
    CheckpointUnavailable,
}

#[async_trait]
impl PollingProcessor for Pipeline {
    type State = Discovered;
    type Error = PipelineError;

    async fn prepare(&mut self, _cold_start: bool) -> Result<Option<Self::State>, Self::Error> {
        if let Err(e) = self.start().await {
            self.checkpoint_unavailable(&e);
            return Ok(Some(Discovered::CheckpointUnavailable));
        }

        match self.discover().await {
            Ok(Some(raw)) => Ok(Some(Discovered::Batch(raw))),
            Ok(None) => {
                self.stats.record(&TickOutcome::Idle);
                Ok(None)
            }
            Err(e) => {
                self.discovery_failed(&e);
                Ok(Some(Discovered::Failed))
            }
        }
    }

    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error> {
        let outcome = match state {
            Discovered::Batch(raw) => self.process_batch(raw).await,
            Discovered::Failed => TickOutcome::DiscoveryFailed,
            Discovered::CheckpointUnavailable => TickOutcome::CheckpointUnavailable,
        };
        self.stats.record(&outcome);
        Ok(outcome.iteration_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sleet_core::polling::run_polling_loop;
    use tokio_util::sync::CancellationToken;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_pipeline_futures_are_send() {
        fn check(pipeline: &mut Pipeline) {
            assert_send(&pipeline.tick());
            assert_send(&run_polling_loop(
                pipeline,
                Duration::from_secs(1),
                CancellationToken::new(),
                "pipeline",
            ));
        }
        let _ = check;
    }
}
