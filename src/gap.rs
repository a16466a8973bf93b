//! Watchdog raising a backfill request when the watermark falls behind the chain head.

use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    registry::ChainState,
    rpc::{ChainClient, Error},
};

/// Lower bound of the check period, for chains with very short block times.
pub const MIN_GAP_CHECK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_GAP_CHECK_MULTIPLIER: u32 = 2;

/// Result of a single check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapCheck {
    /// The watermark is at most one block behind.
    InSync { head: u64, watermark: u64 },
    /// A backfill was requested (`raised`) or one was already pending.
    Behind { head: u64, watermark: u64, raised: bool },
}

pub struct GapMonitor<C> {
    state: Arc<ChainState>,
    client: C,
    interval: Duration,
}

impl<C: ChainClient> GapMonitor<C> {
    /// Checks every `block_time * multiplier`, but never more often than once per second.
    #[must_use]
    pub fn new(state: Arc<ChainState>, client: C, multiplier: u32) -> Self {
        let interval = state.config().block_time().saturating_mul(multiplier).max(MIN_GAP_CHECK_INTERVAL);
        Self { state, client, interval }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reads the head once and raises a backfill if more than one block is missing.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the head cannot be read.
    pub async fn check_once(&self) -> Result<GapCheck, Error> {
        let head = self.client.block_number().await?;
        self.state.observe_head(head);
        let watermark = self.state.last_processed_block();

        if head.saturating_sub(watermark) <= 1 {
            return Ok(GapCheck::InSync { head, watermark });
        }

        let raised = self.state.raise_backfill();
        if raised {
            info!(chain = %self.state.name(), head, watermark, missing = head - watermark, "Gap detected, backfill requested");
        }
        Ok(GapCheck::Behind { head, watermark, raised })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(chain = %self.state.name(), interval_ms = self.interval.as_millis(), "Starting gap monitor");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let checked = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                checked = self.check_once() => checked,
            };
            if let Err(e) = checked {
                warn!(chain = %self.state.name(), error = %e, "Gap check failed");
            }
        }

        debug!(chain = %self.state.name(), "Gap monitor stopped");
    }
}
