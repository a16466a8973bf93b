//! Accept/duplicate/reorg decision for every incoming log.
//!
//! [`DedupEngine::admit`] is the single serialization point of a chain: the duplicate check, the
//! reorg check, the key insertion, the watermark update and the dedup-set cleanup all happen
//! under one acquisition of the chain's write lock, so live and backfill deliveries of the same
//! log are resolved first writer wins.

use alloy::rpc::types::Log;
use tracing::{debug, warn};

use crate::{
    registry::{ChainState, Cursor, Recovery},
    types::DedupKey,
};

/// Dedup set size above which inline eviction runs.
pub const DEFAULT_DEDUP_THRESHOLD: usize = 100_000;
/// Keys of blocks within this many blocks of the current log survive eviction.
pub const DEFAULT_RETENTION_WINDOW: u64 = 1_000;

/// Outcome of [`DedupEngine::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// New log; its key is recorded and it must be classified and emitted.
    Accept(DedupKey),
    /// Already emitted.
    Duplicate,
    /// The log is below the watermark. It is discarded and a recovery was requested.
    ReorgSignal { block_number: u64, watermark: u64 },
    /// Pending log without a position; it cannot be deduplicated.
    Malformed,
}

impl Admission {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accept(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DedupEngine {
    threshold: usize,
    retention_window: u64,
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_THRESHOLD, DEFAULT_RETENTION_WINDOW)
    }
}

impl DedupEngine {
    #[must_use]
    pub fn new(threshold: usize, retention_window: u64) -> Self {
        Self { threshold, retention_window }
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn retention_window(&self) -> u64 {
        self.retention_window
    }

    /// Decides what to do with `log` and records the decision in `state`.
    ///
    /// An already recorded key is a duplicate wherever it sits. Otherwise a log strictly below
    /// the watermark is a reorg signal; new logs in the watermark block itself are siblings of
    /// already accepted ones. While a recovery is in flight, old logs are accepted without moving
    /// the watermark.
    pub fn admit(&self, state: &ChainState, log: &Log) -> Admission {
        let Some(key) = DedupKey::from_log(log) else {
            state.write().stats.malformed += 1;
            warn!(chain = %state.name(), "Dropping log without block number, tx hash or index");
            return Admission::Malformed;
        };

        let mut cursor = state.write();
        let watermark = cursor.last_processed_block;

        // a recorded key is a redelivery, never evidence of a reorg
        if cursor.processed_keys.contains(&key) {
            cursor.stats.duplicates += 1;
            return Admission::Duplicate;
        }

        if key.block_number < watermark && !cursor.reorg_in_flight() {
            cursor.recovery = Recovery::Requested { from: watermark.saturating_add(1) };
            cursor.stats.reorgs_detected += 1;
            let raised = cursor.raise_signal();
            drop(cursor);

            warn!(
                chain = %state.name(),
                block_number = key.block_number,
                watermark,
                "Log below watermark, possible reorg; requesting recovery"
            );
            if raised {
                state.notify_backfill();
            }
            return Admission::ReorgSignal { block_number: key.block_number, watermark };
        }

        cursor.processed_keys.insert(key);
        cursor.stats.accepted += 1;

        if !cursor.reorg_in_flight() {
            cursor.last_processed_block = watermark.max(key.block_number);
        }

        if cursor.processed_keys.len() > self.threshold {
            let evicted = self.evict_stale(&mut cursor, key.block_number);
            debug!(chain = %state.name(), evicted, remaining = cursor.processed_keys.len(), "Evicted stale dedup keys");
        }

        Admission::Accept(key)
    }

    /// Removes every key whose block is below `current_block - retention_window`.
    fn evict_stale(&self, cursor: &mut Cursor, current_block: u64) -> usize {
        let cutoff = current_block.saturating_sub(self.retention_window);
        let before = cursor.processed_keys.len();
        cursor.processed_keys.retain(|key| key.block_number >= cutoff);
        let evicted = before - cursor.processed_keys.len();
        cursor.stats.keys_evicted += evicted as u64;
        evicted
    }
}
