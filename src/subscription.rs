//! Live feed of new logs for one chain.
//!
//! Each connection attempt prefers a push subscription and falls back to polling the chain head
//! when the push endpoint cannot be dialed or the subscription drops. While polling, push is
//! dialed again every `push_redial_polls` successful polls. Attempts are separated by the
//! reconnect [`Backoff`]; the counter resets every time a connection proves healthy.
//!
//! Polling only ever delivers a contiguous run of blocks: a failed window ends the poll, and the
//! next poll resumes at that window.

use std::time::Duration;

use alloy::rpc::types::Filter;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    backoff::{Backoff, BackoffPolicy},
    processor::LogProcessor,
    range::RangeExecutor,
    rpc::{ChainClient, Error, LogSubscriber},
};

/// Default period between two head polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of successful polls before push is dialed again.
pub const DEFAULT_PUSH_REDIAL_POLLS: u32 = 30;

pub struct SubscriptionManager<C, S> {
    processor: LogProcessor,
    executor: RangeExecutor<C>,
    subscriber: Option<S>,
    filter: Filter,
    poll_interval: Duration,
    push_redial_polls: u32,
    backoff: BackoffPolicy,
}

impl<C: ChainClient, S: LogSubscriber> SubscriptionManager<C, S> {
    /// Without a `subscriber` the chain is only polled.
    #[must_use]
    pub fn new(processor: LogProcessor, executor: RangeExecutor<C>, subscriber: Option<S>) -> Self {
        let filter = processor.state().config().log_filter();
        Self {
            processor,
            executor,
            subscriber,
            filter,
            poll_interval: DEFAULT_POLL_INTERVAL,
            push_redial_polls: DEFAULT_PUSH_REDIAL_POLLS,
            backoff: BackoffPolicy::default(),
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Successful polls after which a failed push subscription is dialed again. Zero is treated
    /// as one.
    #[must_use]
    pub fn push_redial_polls(mut self, polls: u32) -> Self {
        self.push_redial_polls = polls.max(1);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `cancel` fires. Failures are logged and retried, never returned.
    pub async fn run(self, cancel: CancellationToken) {
        let chain = self.processor.state().name().to_string();
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut last_polled = None;

        info!(chain = %chain, push = self.subscriber.is_some(), "Starting live feed");

        loop {
            match self.connect_once(&cancel, &mut backoff, &mut last_polled).await {
                Error::Cancelled => break,
                e => warn!(chain = %chain, error = %e, attempt = backoff.attempt(), "Live feed interrupted, reconnecting"),
            }
            if !backoff.wait(&cancel).await {
                break;
            }
        }

        info!(chain = %chain, "Live feed stopped");
    }

    /// One connection attempt: push if possible, then polling, alternating while polling keeps
    /// working. Only returns on failure.
    async fn connect_once(
        &self,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
        last_polled: &mut Option<u64>,
    ) -> Error {
        let state = self.processor.state();
        loop {
            if let Some(subscriber) = &self.subscriber {
                match self.push(subscriber, cancel, backoff).await {
                    Error::Cancelled => return Error::Cancelled,
                    e => warn!(
                        chain = %state.name(),
                        error = %e,
                        "Push subscription failed, falling back to polling"
                    ),
                }
                // push may have moved the watermark past the last poll
                let watermark = state.last_processed_block();
                if watermark > 0 {
                    *last_polled =
                        Some(last_polled.map_or(watermark, |polled| polled.max(watermark)));
                }
            }

            match self.poll(cancel, backoff, last_polled).await {
                Ok(()) => debug!(chain = %state.name(), "Dialing push subscription again"),
                Err(e) => return e,
            }
        }
    }

    async fn push(&self, subscriber: &S, cancel: &CancellationToken, backoff: &mut Backoff) -> Error {
        let chain = self.processor.state().name();

        let subscribed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Error::Cancelled,
            subscribed = subscriber.subscribe_logs(&self.filter) => subscribed,
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => return e,
        };
        backoff.reset();
        info!(chain = %chain, "Push subscription active");

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return Error::Cancelled,
                item = stream.next() => item,
            };
            match item {
                None => return Error::SubscriptionClosed,
                Some(Err(e)) => return e,
                Some(Ok(log)) if log.removed => {
                    debug!(chain = %chain, block_number = ?log.block_number, "Ignoring removed log");
                }
                Some(Ok(log)) => {
                    let admission = self.processor.process(&log).await;
                    trace!(chain = %chain, ?admission, "Live log processed");
                }
            }
        }
    }

    /// Polls the head every `poll_interval` and fetches the blocks added since the last poll.
    ///
    /// The first poll after startup only records the baseline; a restart after a failure
    /// resumes from where the previous poll stopped.
    ///
    /// Returns `Ok(())` once `push_redial_polls` polls succeeded and a push subscriber is
    /// configured; without one it only returns on failure.
    async fn poll(
        &self,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
        last_polled: &mut Option<u64>,
    ) -> Result<(), Error> {
        let state = self.processor.state();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polls = 0;

        debug!(chain = %state.name(), interval_ms = self.poll_interval.as_millis(), "Polling for new logs");

        loop {
            if self.subscriber.is_some() && polls >= self.push_redial_polls {
                return Ok(());
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {}
            }

            let head = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                head = self.executor.client().block_number() => head,
            };
            let head = head?;
            backoff.reset();
            state.observe_head(head);
            polls += 1;

            let Some(previous) = *last_polled else {
                *last_polled = Some(head);
                continue;
            };
            if head <= previous {
                continue;
            }

            let report =
                self.executor.fetch_prefix(previous + 1, head, &self.processor, cancel).await?;
            *last_polled = Some(report.completed_through().max(previous));
        }
    }
}
