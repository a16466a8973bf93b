//! Per-chain processing state and the registry handing it out.
//!
//! The registry map and each chain's [`Cursor`] are guarded independently: looking up a chain
//! never waits on another chain's log processing. All mutation of a cursor happens under its
//! write lock, and no guard is ever held across an `.await`.

use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{config::ChainConfig, types::DedupKey};

/// Recovery state of one chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Recovery {
    #[default]
    Idle,
    /// A reorg was detected; recovery must start at `from`, captured when it was raised.
    Requested { from: u64 },
    /// A backfill is executing.
    Running,
}

/// Counters reported by [`ChainState::snapshot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub reorgs_detected: u64,
    pub signals_raised: u64,
    pub signals_coalesced: u64,
    pub keys_evicted: u64,
    pub recoveries_completed: u64,
}

/// Mutable part of a chain's state.
#[derive(Debug, Default)]
pub struct Cursor {
    /// Watermark; 0 means no head was observed yet.
    pub(crate) last_processed_block: u64,
    pub(crate) processed_keys: HashSet<DedupKey>,
    pub(crate) recovery: Recovery,
    /// Single-slot backfill mailbox.
    pub(crate) signal_pending: bool,
    pub(crate) stats: ChainStats,
}

impl Cursor {
    /// Sets the backfill slot. Returns `false` if a signal was already pending.
    pub(crate) fn raise_signal(&mut self) -> bool {
        if self.signal_pending {
            self.stats.signals_coalesced += 1;
            return false;
        }
        self.signal_pending = true;
        self.stats.signals_raised += 1;
        true
    }

    #[must_use]
    pub(crate) fn reorg_in_flight(&self) -> bool {
        self.recovery != Recovery::Idle
    }
}

/// Point-in-time view of a chain, for reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub chain: String,
    pub last_processed_block: u64,
    pub tracked_keys: usize,
    pub recovery: Recovery,
    pub signal_pending: bool,
    pub stats: ChainStats,
}

#[derive(Debug)]
pub struct ChainState {
    config: Arc<ChainConfig>,
    cursor: RwLock<Cursor>,
    backfill_wakeup: Notify,
}

impl ChainState {
    #[must_use]
    pub fn new(config: Arc<ChainConfig>) -> Self {
        Self { config, cursor: RwLock::new(Cursor::default()), backfill_wakeup: Notify::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ChainConfig> {
        &self.config
    }

    #[must_use]
    pub fn last_processed_block(&self) -> u64 {
        self.cursor.read().last_processed_block
    }

    #[must_use]
    pub fn reorg_in_flight(&self) -> bool {
        self.cursor.read().reorg_in_flight()
    }

    #[must_use]
    pub fn recovery(&self) -> Recovery {
        self.cursor.read().recovery
    }

    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.cursor.read().processed_keys.contains(key)
    }

    /// Replaces the uninitialized watermark with the first observed head. Returns `true` if the
    /// watermark was initialized by this call.
    pub fn observe_head(&self, head: u64) -> bool {
        let mut cursor = self.cursor.write();
        if cursor.last_processed_block != 0 || head == 0 {
            return false;
        }
        cursor.last_processed_block = head;
        drop(cursor);
        info!(chain = %self.name(), block_number = head, "Initialized watermark from chain head");
        true
    }

    /// Requests a backfill. A request made while one is already pending is dropped.
    ///
    /// Returns `true` if the request was queued.
    pub fn raise_backfill(&self) -> bool {
        let raised = self.cursor.write().raise_signal();
        if raised {
            self.backfill_wakeup.notify_one();
        } else {
            debug!(chain = %self.name(), "Backfill already pending, signal coalesced");
        }
        raised
    }

    pub(crate) fn notify_backfill(&self) {
        self.backfill_wakeup.notify_one();
    }

    /// Takes the pending backfill request, if any.
    pub fn take_backfill_signal(&self) -> bool {
        std::mem::take(&mut self.cursor.write().signal_pending)
    }

    /// Waits until a backfill request is pending, then takes it.
    pub async fn backfill_requested(&self) {
        loop {
            let notified = self.backfill_wakeup.notified();
            if self.take_backfill_signal() {
                return;
            }
            notified.await;
        }
    }

    /// Claims the recovery slot.
    ///
    /// Returns the first block to recover, or `None` when a recovery is already running. A
    /// lower bound captured when a reorg was raised takes precedence over the current watermark.
    pub fn begin_recovery(&self) -> Option<u64> {
        let mut cursor = self.cursor.write();
        let from = match cursor.recovery {
            Recovery::Running => return None,
            Recovery::Requested { from } => from,
            Recovery::Idle => cursor.last_processed_block.saturating_add(1),
        };
        cursor.recovery = Recovery::Running;
        Some(from)
    }

    /// Moves the watermark to `block`. Only the recovery owner calls this.
    pub fn set_watermark(&self, block: u64) {
        self.cursor.write().last_processed_block = block;
    }

    /// Releases the recovery slot.
    pub fn end_recovery(&self) {
        let mut cursor = self.cursor.write();
        cursor.recovery = Recovery::Idle;
        cursor.stats.recoveries_completed += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> ChainSnapshot {
        let cursor = self.cursor.read();
        ChainSnapshot {
            chain: self.config.name.clone(),
            last_processed_block: cursor.last_processed_block,
            tracked_keys: cursor.processed_keys.len(),
            recovery: cursor.recovery,
            signal_pending: cursor.signal_pending,
            stats: cursor.stats,
        }
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Cursor> {
        self.cursor.write()
    }
}

/// Chain name to [`ChainState`] map.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: DashMap<String, Arc<ChainState>>,
}

impl ChainRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ChainState>> {
        self.chains.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the state registered under `config.name`, creating it on first use. An existing
    /// state keeps the configuration it was created with.
    pub fn get_or_create(&self, config: Arc<ChainConfig>) -> Arc<ChainState> {
        let entry = self.chains.entry(config.name.clone()).or_insert_with(|| {
            debug!(chain = %config.name, "Registering chain state");
            Arc::new(ChainState::new(Arc::clone(&config)))
        });
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn chains(&self) -> Vec<String> {
        let mut names: Vec<_> = self.chains.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<ChainSnapshot> {
        self.get(name).map(|state| state.snapshot())
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<ChainSnapshot> {
        self.chains().iter().filter_map(|name| self.snapshot(name)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
