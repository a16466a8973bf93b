//! Recovery of missed or reorganized blocks.
//!
//! The coordinator waits for the chain's backfill signal and runs one recovery at a time. A
//! recovery covers `from..=head`, where `head` is read when it starts and `from` is either the
//! lower bound captured when a reorg was detected or the block after the watermark. The span is
//! walked in windows of at most `max_window` blocks; the watermark moves forward after every
//! window, so progress survives a later failure.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backoff::{Backoff, BackoffPolicy},
    processor::LogProcessor,
    range::RangeExecutor,
    rpc::{ChainClient, Error},
};

/// Default maximum number of blocks covered by one backfill window.
pub const DEFAULT_MAX_BACKFILL_WINDOW: u64 = 1_000;

/// Outcome of [`BackfillCoordinator::recover`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Another recovery holds the slot; nothing was done.
    AlreadyRunning,
    /// Nothing to recover.
    UpToDate { watermark: u64 },
    /// Every block of `from..=to` was processed.
    CaughtUp { from: u64, to: u64, windows: u64 },
    /// A window failed; the watermark stops at `reached`.
    Partial { from: u64, reached: u64, windows: u64 },
}

pub struct BackfillCoordinator<C> {
    processor: LogProcessor,
    executor: RangeExecutor<C>,
    max_window: u64,
    backoff: BackoffPolicy,
}

impl<C: ChainClient> BackfillCoordinator<C> {
    #[must_use]
    pub fn new(processor: LogProcessor, executor: RangeExecutor<C>) -> Self {
        Self {
            processor,
            executor,
            max_window: DEFAULT_MAX_BACKFILL_WINDOW,
            backoff: BackoffPolicy::default(),
        }
    }

    /// A zero window is treated as one block.
    #[must_use]
    pub fn max_window(mut self, max_window: u64) -> Self {
        self.max_window = max_window.max(1);
        self
    }

    /// Delay schedule before retrying a recovery that failed or stopped short.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Serves backfill signals until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let state = self.processor.state();
        let mut backoff = Backoff::new(self.backoff.clone());
        debug!(chain = %state.name(), max_window = self.max_window, "Starting backfill coordinator");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = state.backfill_requested() => {}
            }

            let retry = match self.recover(&cancel).await {
                Ok(RecoveryOutcome::Partial { reached, .. }) => {
                    warn!(chain = %state.name(), reached, "Backfill stopped short, will retry");
                    true
                }
                Ok(outcome) => {
                    debug!(chain = %state.name(), ?outcome, "Backfill finished");
                    backoff.reset();
                    false
                }
                Err(Error::Cancelled) => break,
                Err(e) => {
                    warn!(chain = %state.name(), error = %e, "Backfill failed, will retry");
                    true
                }
            };

            if retry {
                if !backoff.wait(&cancel).await {
                    break;
                }
                state.raise_backfill();
            }
        }

        debug!(chain = %state.name(), "Backfill coordinator stopped");
    }

    /// Runs one recovery up to the current head.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the head cannot be read (the recovery slot is left as it
    /// was), or [`Error::Cancelled`].
    pub async fn recover(&self, cancel: &CancellationToken) -> Result<RecoveryOutcome, Error> {
        let state = self.processor.state();

        let head = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            head = self.executor.client().block_number() => head?,
        };
        state.observe_head(head);

        let Some(from) = state.begin_recovery() else {
            debug!(chain = %state.name(), "Recovery already running, ignoring signal");
            return Ok(RecoveryOutcome::AlreadyRunning);
        };

        let outcome = self.walk(from, head, cancel).await;
        state.end_recovery();
        outcome
    }

    async fn walk(
        &self,
        from: u64,
        head: u64,
        cancel: &CancellationToken,
    ) -> Result<RecoveryOutcome, Error> {
        let state = self.processor.state();
        if from > head {
            return Ok(RecoveryOutcome::UpToDate { watermark: state.last_processed_block() });
        }
        info!(chain = %state.name(), from, to = head, "Starting recovery");

        let mut windows = 0;
        let mut start = from;
        while start <= head {
            let end = head.min(start.saturating_add(self.max_window - 1));
            let report = self.executor.fetch(start, end, &self.processor, cancel).await?;
            windows += 1;

            let reached = report.completed_through();
            if reached >= start {
                state.set_watermark(reached);
            }
            if !report.is_complete() {
                return Ok(RecoveryOutcome::Partial { from, reached, windows });
            }

            debug!(chain = %state.name(), window_start = start, window_end = end, accepted = report.accepted, "Backfill window done");
            start = end + 1;
        }

        info!(chain = %state.name(), from, to = head, windows, "Recovery complete");
        Ok(RecoveryOutcome::CaughtUp { from, to: head, windows })
    }
}
