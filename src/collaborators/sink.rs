use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::info;

use crate::types::ProcessedTransaction;

/// Final destination of classified transactions.
pub trait TransactionSink: Send + Sync {
    fn emit(&self, transaction: ProcessedTransaction);
}

/// Writes every transaction to the `tracing` output.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

impl TransactionSink for LoggingSink {
    fn emit(&self, transaction: ProcessedTransaction) {
        info!(
            chain = %transaction.chain,
            kind = %transaction.kind,
            event = %transaction.event_name,
            block_number = transaction.block_number,
            tx_hash = %transaction.tx_hash,
            amount = %transaction.amount,
            token = transaction.token_symbol.as_deref().unwrap_or("-"),
            fiat_value = ?transaction.fiat_value,
            "Processed transaction"
        );
    }
}

/// Bounded in-memory store; once full, the oldest entry is dropped for each new one.
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    inner: Mutex<MemorySinkInner>,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    transactions: VecDeque<ProcessedTransaction>,
    dropped: u64,
}

impl MemorySink {
    /// A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(MemorySinkInner::default()) }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transactions evicted to respect the capacity.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Copies the stored transactions, oldest first.
    #[must_use]
    pub fn transactions(&self) -> Vec<ProcessedTransaction> {
        self.inner.lock().transactions.iter().cloned().collect()
    }
}

impl TransactionSink for MemorySink {
    fn emit(&self, transaction: ProcessedTransaction) {
        let mut inner = self.inner.lock();
        if inner.transactions.len() == self.capacity {
            inner.transactions.pop_front();
            inner.dropped += 1;
        }
        inner.transactions.push_back(transaction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transaction_at;

    #[test]
    fn keeps_the_newest_entries() {
        let sink = MemorySink::new(2);
        for block in 1..=3 {
            sink.emit(transaction_at(block));
        }

        let blocks: Vec<_> = sink.transactions().iter().map(|tx| tx.block_number).collect();
        assert_eq!(blocks, vec![2, 3]);
        assert_eq!(sink.dropped(), 1);
        assert_eq!(sink.len(), 2);
    }
}
