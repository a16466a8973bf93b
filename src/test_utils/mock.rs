use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use alloy::{
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::rpc::{ChainClient, Error, LogStream, LogSubscriber};

#[derive(Debug, Default)]
struct ChainScript {
    head: u64,
    logs: Vec<Log>,
    range_limit: Option<u64>,
    failing: Vec<RangeInclusive<u64>>,
    head_failures: usize,
    head_calls: usize,
    calls: Vec<(u64, u64)>,
    latency: Duration,
}

/// Scripted in-memory chain.
///
/// Serves the stored logs for any requested range, optionally rejecting ranges wider than a
/// limit with a provider-style "range too large" error, failing requests that touch given blocks,
/// or failing head queries.
#[derive(Clone, Debug, Default)]
pub struct MockChain {
    script: Arc<Mutex<ChainScript>>,
}

impl MockChain {
    #[must_use]
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    #[must_use]
    pub fn head(&self) -> u64 {
        self.script.lock().head
    }

    pub fn set_head(&self, head: u64) {
        self.script.lock().head = head;
    }

    pub fn push_log(&self, log: Log) {
        self.script.lock().logs.push(log);
    }

    pub fn push_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.script.lock().logs.extend(logs);
    }

    /// Requests spanning more than `limit` blocks fail as too large. `Some(0)` rejects all.
    pub fn set_range_limit(&self, limit: Option<u64>) {
        self.script.lock().range_limit = limit;
    }

    /// Requests overlapping `blocks` fail with a transport error.
    pub fn fail_range(&self, blocks: RangeInclusive<u64>) {
        self.script.lock().failing.push(blocks);
    }

    pub fn clear_failures(&self) {
        self.script.lock().failing.clear();
    }

    /// The next `count` head queries fail.
    pub fn fail_next_heads(&self, count: usize) {
        self.script.lock().head_failures = count;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = latency;
    }

    /// `(from, to)` of every `get_logs` request, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.script.lock().calls.clone()
    }

    #[must_use]
    pub fn head_calls(&self) -> usize {
        self.script.lock().head_calls
    }
}

fn backend_gone() -> Error {
    RpcError::Transport(TransportErrorKind::BackendGone).into()
}

impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, Error> {
        let mut script = self.script.lock();
        script.head_calls += 1;
        if script.head_failures > 0 {
            script.head_failures -= 1;
            return Err(backend_gone());
        }
        Ok(script.head)
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        let latency = self.script.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.script.lock();
        let from = filter.get_from_block().unwrap_or_default();
        let to = filter.get_to_block().unwrap_or(script.head);
        script.calls.push((from, to));

        if let Some(limit) = script.range_limit {
            if to - from + 1 > limit {
                return Err(TransportErrorKind::custom_str(&format!(
                    "query returned more than 10000 results, try a block range of at most {limit}"
                ))
                .into());
            }
        }
        if script.failing.iter().any(|blocks| *blocks.start() <= to && from <= *blocks.end()) {
            return Err(backend_gone());
        }

        Ok(script
            .logs
            .iter()
            .filter(|log| log.block_number.is_some_and(|block| (from..=to).contains(&block)))
            .filter(|log| filter.address.matches(&log.address()))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct SubscriberScript {
    streams: Vec<mpsc::UnboundedSender<Result<Log, Error>>>,
    failing: bool,
    dials: usize,
}

/// Push subscriber driven by the test: every accepted dial opens a stream fed by
/// [`MockSubscriber::emit`].
#[derive(Clone, Debug, Default)]
pub struct MockSubscriber {
    script: Arc<Mutex<SubscriberScript>>,
}

impl MockSubscriber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following dial fail.
    pub fn set_failing(&self, failing: bool) {
        self.script.lock().failing = failing;
    }

    /// Sends `log` to every open subscription. Returns how many received it.
    pub fn emit(&self, log: &Log) -> usize {
        let mut script = self.script.lock();
        script.streams.retain(|stream| stream.send(Ok(log.clone())).is_ok());
        script.streams.len()
    }

    /// Ends every open subscription.
    pub fn disconnect(&self) {
        self.script.lock().streams.clear();
    }

    #[must_use]
    pub fn dials(&self) -> usize {
        self.script.lock().dials
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        let mut script = self.script.lock();
        script.streams.retain(|stream| !stream.is_closed());
        script.streams.len()
    }
}

impl LogSubscriber for MockSubscriber {
    async fn subscribe_logs(&self, _filter: &Filter) -> Result<LogStream, Error> {
        let mut script = self.script.lock();
        script.dials += 1;
        if script.failing {
            return Err(backend_gone());
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        script.streams.push(sender);
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }
}
