//! Chunked historical log queries.
//!
//! A requested span is split into consecutive windows of at most `max_block_range` blocks, each
//! fetched on its own. When the provider rejects a window as too large the window is halved and
//! both halves are retried, down to single blocks; a single block that is still rejected is
//! skipped with a warning. Any other provider error fails that window only, unless the fetch
//! was asked for a contiguous prefix, in which case nothing after the failed window is fetched.

use std::{collections::VecDeque, ops::RangeInclusive};

use alloy::rpc::types::{Filter, Log};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    engine::Admission,
    processor::LogProcessor,
    rpc::{ChainClient, Error},
};

/// Default maximum span of a single `eth_getLogs` request.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 100;

/// Consecutive inclusive windows of at most `size` blocks covering `from..=to`.
#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<u64>,
    end: u64,
    size: u64,
}

impl Chunks {
    /// A zero `size` is treated as one.
    #[must_use]
    pub fn new(from: u64, to: u64, size: u64) -> Self {
        Self { next: (from <= to).then_some(from), end: to, size: size.max(1) }
    }
}

impl Iterator for Chunks {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let end = start.saturating_add(self.size - 1).min(self.end);
        self.next = (end < self.end).then(|| end + 1);
        Some(start..=end)
    }
}

/// Outcome of [`RangeExecutor::fetch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub from: u64,
    pub to: u64,
    /// Logs handed to the processor.
    pub delivered: usize,
    /// Logs the processor accepted as new.
    pub accepted: usize,
    /// Windows fetched successfully, in fetch order.
    pub completed: Vec<RangeInclusive<u64>>,
    /// Single blocks the provider kept rejecting as too large.
    pub skipped: Vec<u64>,
    /// Windows that failed with any other error.
    pub failed: Vec<RangeInclusive<u64>>,
}

impl FetchReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Highest block such that every block from `from` up to it was fetched or skipped;
    /// `from - 1` when the first window failed.
    #[must_use]
    pub fn completed_through(&self) -> u64 {
        self.failed
            .iter()
            .map(|window| *window.start())
            .min()
            .map_or(self.to, |start| start.saturating_sub(1))
    }
}

/// Fetches logs for arbitrary block spans and feeds them to a [`LogProcessor`].
#[derive(Clone, Debug)]
pub struct RangeExecutor<C> {
    client: C,
    filter: Filter,
    max_block_range: u64,
}

impl<C: ChainClient> RangeExecutor<C> {
    #[must_use]
    pub fn new(client: C, filter: Filter, max_block_range: u64) -> Self {
        Self { client, filter, max_block_range: max_block_range.max(1) }
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn max_block_range(&self) -> u64 {
        self.max_block_range
    }

    /// Fetches `from..=to` window by window and processes every log once, in block and log
    /// index order within each window.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`]; provider failures are reported in the [`FetchReport`].
    pub async fn fetch(
        &self,
        from: u64,
        to: u64,
        processor: &LogProcessor,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, Error> {
        self.fetch_windows(from, to, processor, cancel, false).await
    }

    /// Like [`fetch`](Self::fetch), but stops at the first failed window: every delivered log
    /// lies in `from..=report.completed_through()`.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`].
    pub async fn fetch_prefix(
        &self,
        from: u64,
        to: u64,
        processor: &LogProcessor,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, Error> {
        self.fetch_windows(from, to, processor, cancel, true).await
    }

    async fn fetch_windows(
        &self,
        from: u64,
        to: u64,
        processor: &LogProcessor,
        cancel: &CancellationToken,
        stop_on_failure: bool,
    ) -> Result<FetchReport, Error> {
        let mut report = FetchReport { from, to, ..FetchReport::default() };
        if from > to {
            return Ok(report);
        }
        debug!(from, to, max_block_range = self.max_block_range, "Fetching log range");

        for chunk in Chunks::new(from, to, self.max_block_range) {
            self.fetch_chunk(chunk, processor, cancel, stop_on_failure, &mut report).await?;
            if stop_on_failure && !report.is_complete() {
                break;
            }
        }

        if report.is_complete() {
            debug!(from, to, delivered = report.delivered, "Log range fetched");
        } else {
            warn!(
                from,
                to,
                failed = report.failed.len(),
                completed_through = report.completed_through(),
                "Log range partially fetched"
            );
        }
        Ok(report)
    }

    async fn fetch_chunk(
        &self,
        chunk: RangeInclusive<u64>,
        processor: &LogProcessor,
        cancel: &CancellationToken,
        stop_on_failure: bool,
        report: &mut FetchReport,
    ) -> Result<(), Error> {
        let mut pending = VecDeque::from([chunk]);

        while let Some(window) = pending.pop_front() {
            let (start, end) = (*window.start(), *window.end());
            let filter = self.filter.clone().from_block(start).to_block(end);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.client.get_logs(&filter) => result,
            };

            match result {
                Ok(mut logs) => {
                    logs.sort_by_key(|log| (log.block_number, log.log_index));
                    self.deliver(&logs, processor, cancel, report).await?;
                    report.completed.push(window);
                }
                Err(e) if e.is_range_too_large() && start < end => {
                    let mid = start + (end - start) / 2;
                    info!(start, end, "Range too large, halving window");
                    pending.push_front(mid + 1..=end);
                    pending.push_front(start..=mid);
                }
                Err(e) if e.is_range_too_large() => {
                    warn!(block_number = start, error = %e, "Single block still too large, skipping");
                    report.skipped.push(start);
                }
                Err(e) => {
                    warn!(start, end, error = %e, "Failed to fetch logs");
                    report.failed.push(window);
                    if stop_on_failure {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    async fn deliver(
        &self,
        logs: &[Log],
        processor: &LogProcessor,
        cancel: &CancellationToken,
        report: &mut FetchReport,
    ) -> Result<(), Error> {
        for log in logs {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.delivered += 1;
            if let Admission::Accept(_) = processor.process(log).await {
                report.accepted += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockChain, chain_config, log_at, processor_for};

    #[test]
    fn chunks_cover_the_span_exactly() {
        let chunks: Vec<_> = Chunks::new(10, 35, 10).collect();
        assert_eq!(chunks, vec![10..=19, 20..=29, 30..=35]);

        assert_eq!(Chunks::new(5, 5, 100).collect::<Vec<_>>(), vec![5..=5]);
        assert_eq!(Chunks::new(6, 5, 100).count(), 0);
        assert_eq!(Chunks::new(u64::MAX - 1, u64::MAX, 10).count(), 1);
    }

    #[test]
    fn completed_through_stops_before_first_failure() {
        let mut report = FetchReport { from: 1, to: 300, ..FetchReport::default() };
        assert_eq!(report.completed_through(), 300);

        report.failed = vec![201..=300, 101..=150];
        assert_eq!(report.completed_through(), 100);

        report.failed = vec![1..=100];
        assert_eq!(report.completed_through(), 0);
    }

    #[tokio::test]
    async fn splits_into_windows_and_delivers_in_order() -> anyhow::Result<()> {
        let chain = MockChain::new(300);
        chain.push_logs([log_at(250, 3, 1), log_at(250, 3, 0), log_at(120, 2, 0), log_at(5, 1, 0)]);
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);

        let report = executor.fetch(1, 300, &processor.processor, &CancellationToken::new()).await?;

        assert_eq!(chain.calls(), vec![(1, 100), (101, 200), (201, 300)]);
        assert!(report.is_complete());
        assert_eq!(report.delivered, 4);
        assert_eq!(report.accepted, 4);
        let emitted: Vec<_> =
            processor.sink.transactions().iter().map(|tx| (tx.block_number, tx.log_index)).collect();
        assert_eq!(emitted, vec![(5, 0), (120, 0), (250, 0), (250, 1)]);
        Ok(())
    }

    #[tokio::test]
    async fn halves_windows_the_provider_rejects() -> anyhow::Result<()> {
        let chain = MockChain::new(100);
        chain.set_range_limit(Some(25));
        chain.push_logs([log_at(30, 1, 0), log_at(99, 2, 0)]);
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);

        let report = executor.fetch(1, 100, &processor.processor, &CancellationToken::new()).await?;

        assert!(report.is_complete());
        assert!(report.skipped.is_empty());
        assert_eq!(report.delivered, 2);
        assert!(chain.calls().iter().skip(1).all(|(from, to)| to - from < 50));
        Ok(())
    }

    #[tokio::test]
    async fn halving_terminates_when_every_size_is_rejected() -> anyhow::Result<()> {
        let chain = MockChain::new(8);
        chain.set_range_limit(Some(0));
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);

        let report = executor.fetch(1, 8, &processor.processor, &CancellationToken::new()).await?;

        assert_eq!(report.skipped, (1..=8).collect::<Vec<_>>());
        assert!(report.completed.is_empty());
        assert_eq!(report.completed_through(), 8);
        // a binary split of 8 blocks visits 15 windows
        assert_eq!(chain.calls().len(), 15);
        Ok(())
    }

    #[tokio::test]
    async fn other_errors_fail_only_their_window() -> anyhow::Result<()> {
        let chain = MockChain::new(300);
        chain.fail_range(150..=150);
        chain.push_logs([log_at(50, 1, 0), log_at(250, 2, 0)]);
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);

        let report = executor.fetch(1, 300, &processor.processor, &CancellationToken::new()).await?;

        assert_eq!(report.failed, vec![101..=200]);
        assert_eq!(report.completed, vec![1..=100, 201..=300]);
        assert_eq!(report.completed_through(), 100);
        assert_eq!(report.delivered, 2);
        assert_eq!(chain.calls().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn prefix_fetch_stops_at_the_first_failed_window() -> anyhow::Result<()> {
        let chain = MockChain::new(300);
        chain.fail_range(150..=150);
        chain.push_logs([log_at(50, 1, 0), log_at(250, 2, 0)]);
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);

        let report =
            executor.fetch_prefix(1, 300, &processor.processor, &CancellationToken::new()).await?;

        assert_eq!(report.failed, vec![101..=200]);
        assert_eq!(report.completed, vec![1..=100]);
        assert_eq!(report.completed_through(), 100);
        assert_eq!(report.delivered, 1);
        assert_eq!(chain.calls(), vec![(1, 100), (101, 200)]);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_stops_the_fetch() {
        let chain = MockChain::new(300);
        let processor = processor_for(chain_config("ethereum"), 1);
        let executor = RangeExecutor::new(chain.clone(), Filter::new(), 100);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.fetch(1, 300, &processor.processor, &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(chain.calls().is_empty());
    }
}
