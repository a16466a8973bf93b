use std::fmt;

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity of one log entry: `(block_number, tx_hash, log_index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DedupKey {
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl DedupKey {
    /// Returns `None` for pending logs, which carry no position yet.
    #[must_use]
    pub fn from_log(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            tx_hash: log.transaction_hash?,
            log_index: log.log_index?,
        })
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.block_number, self.tx_hash, self.log_index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        })
    }
}

/// One classified log, as handed to the sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessedTransaction {
    /// When the log was classified, not the block time.
    pub timestamp: DateTime<Utc>,
    pub chain: String,
    pub kind: TransactionKind,
    /// Raw on-chain amount, not scaled by decimals.
    pub amount: U256,
    pub token_decimals: Option<u8>,
    pub fiat_value: Option<f64>,
    pub from: Address,
    pub to: Address,
    pub token_symbol: Option<String>,
    pub event_name: String,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub observed_wallet: Address,
}

impl ProcessedTransaction {
    #[must_use]
    pub fn key(&self) -> DedupKey {
        DedupKey {
            block_number: self.block_number,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}
