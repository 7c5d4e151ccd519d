//! Generic trigger loop trait and runner.
//!
//! `prepare` (discovery) and the wait between ticks are cancellable;
//! `process` always runs to completion once started, so an in-flight
//! write and its bookkeeping are never abandoned halfway.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emit;
use crate::metrics::events::{TickCompleted, TickResultType};

/// Result of a single processing iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationResult {
    /// Items were processed successfully.
    ProcessedItems,
    /// No items were available to process.
    NoItems,
    /// The iteration failed; its work is retried on a later tick.
    Failed,
    /// Shutdown was requested.
    Shutdown,
}

impl IterationResult {
    fn result_type(&self) -> Option<TickResultType> {
        match self {
            IterationResult::ProcessedItems => Some(TickResultType::Processed),
            IterationResult::NoItems => Some(TickResultType::Idle),
            IterationResult::Failed => Some(TickResultType::Failed),
            IterationResult::Shutdown => None,
        }
    }
}

/// Trait for implementing a trigger-driven processor.
#[async_trait]
pub trait PollingProcessor {
    /// The state type prepared for each iteration.
    type State: Send;
    /// The error type for this processor. Returning it stops the loop.
    type Error: std::error::Error + Send;

    /// Prepare state for a processing iteration.
    ///
    /// Returns `None` if there's no work to do, or `Err` only for
    /// unrecoverable errors.
    ///
    /// # Arguments
    /// * `cold_start` - True on the first iteration
    async fn prepare(&mut self, cold_start: bool) -> Result<Option<Self::State>, Self::Error>;

    /// Process the prepared state. Not raced against shutdown.
    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error>;
}

/// Run the trigger loop with the given processor.
///
/// 1. Call `prepare()` (with cold_start=true on first iteration)
/// 2. Call `process()` if there's work to do
/// 3. Wait for the remainder of `interval`, or until shutdown
/// 4. Repeat until shutdown
pub async fn run_polling_loop<P: PollingProcessor>(
    processor: &mut P,
    interval: Duration,
    shutdown: CancellationToken,
    name: &str,
) -> Result<(), P::Error> {
    let mut first_iteration = true;

    loop {
        let iteration_start = Instant::now();

        let shutdown_clone = shutdown.clone();
        let state = tokio::select! {
            biased;

            _ = shutdown_clone.cancelled() => {
                info!(target = name, "Shutdown requested during discovery");
                return Ok(());
            }

            result = async {
                let cold_start = first_iteration;
                first_iteration = false;
                processor.prepare(cold_start).await
            } => result?,
        };

        let result = match state {
            Some(s) => {
                let result = processor.process(s).await?;
                if shutdown.is_cancelled() {
                    info!(target = name, "Shutdown requested during processing, batch completed");
                }
                result
            }
            None => {
                debug!(target = name, "No items to process");
                IterationResult::NoItems
            }
        };

        let Some(result_type) = result.result_type() else {
            break;
        };
        let elapsed = iteration_start.elapsed();
        emit!(TickCompleted {
            result: result_type,
            duration: elapsed,
            target: name.to_string(),
        });

        if result == IterationResult::Failed {
            warn!(target = name, "Tick failed, its files will be retried");
        }

        let remaining = interval.saturating_sub(elapsed);
        debug!(
            target = name,
            "Tick {} in {:?}, waiting {:?} before next trigger",
            result_type.as_str(),
            elapsed,
            remaining
        );

        if shutdown
            .run_until_cancelled(tokio::time::sleep(remaining))
            .await
            .is_none()
        {
            info!(target = name, "Shutdown requested during trigger wait");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, snafu::Snafu)]
    enum Fatal {
        #[snafu(display("fatal"))]
        Boom,
    }

    struct Counting {
        prepared: Arc<AtomicUsize>,
        processed: Arc<AtomicUsize>,
        cold_starts: usize,
        work: bool,
        stop_after: Option<(usize, CancellationToken)>,
        fail_with_error: bool,
    }

    impl Counting {
        fn new(work: bool) -> Self {
            Self {
                prepared: Arc::new(AtomicUsize::new(0)),
                processed: Arc::new(AtomicUsize::new(0)),
                cold_starts: 0,
                work,
                stop_after: None,
                fail_with_error: false,
            }
        }
    }

    #[async_trait]
    impl PollingProcessor for Counting {
        type State = ();
        type Error = Fatal;

        async fn prepare(&mut self, cold_start: bool) -> Result<Option<()>, Fatal> {
            if cold_start {
                self.cold_starts += 1;
            }
            self.prepared.fetch_add(1, Ordering::SeqCst);
            if self.fail_with_error {
                return Err(Fatal::Boom);
            }
            Ok(self.work.then_some(()))
        }

        async fn process(&mut self, _state: ()) -> Result<IterationResult, Fatal> {
            let n = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, token)) = &self.stop_after {
                if n >= *limit {
                    token.cancel();
                }
            }
            Ok(IterationResult::ProcessedItems)
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut processor = Counting::new(true);
        run_polling_loop(&mut processor, Duration::from_millis(10), shutdown, "test")
            .await
            .unwrap();

        assert_eq!(processor.prepared.load(Ordering::SeqCst), 0);
        assert_eq!(processor.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_finishes_when_cancelled_mid_batch() {
        let shutdown = CancellationToken::new();
        let mut processor = Counting::new(true);
        processor.stop_after = Some((3, shutdown.clone()));

        run_polling_loop(&mut processor, Duration::from_millis(1), shutdown, "test")
            .await
            .unwrap();

        assert_eq!(processor.processed.load(Ordering::SeqCst), 3);
        assert_eq!(processor.prepared.load(Ordering::SeqCst), 3);
        assert_eq!(processor.cold_starts, 1);
    }

    #[tokio::test]
    async fn test_idle_loop_waits_and_stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let mut processor = Counting::new(false);
        let prepared = processor.prepared.clone();

        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            run_polling_loop(&mut processor, Duration::from_secs(60), token, "test").await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap()
            .unwrap();

        // One discovery, then the long wait was interrupted
        assert_eq!(prepared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prepare_error_stops_loop() {
        let mut processor = Counting::new(true);
        processor.fail_with_error = true;

        let result = run_polling_loop(
            &mut processor,
            Duration::from_millis(1),
            CancellationToken::new(),
            "test",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(processor.processed.load(Ordering::SeqCst), 0);
    }
}
