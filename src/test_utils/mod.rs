//! Fixtures and scripted collaborators for unit and integration tests.
//!
//! Enabled for the crate's own tests and, through the `test-utils` feature, for the integration
//! tests under `tests/`.

#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;

use alloy::{
    primitives::{self, Address, B256, Bytes, LogData, U256, address, keccak256},
    rpc::types::Log,
};
use chrono::Utc;

use crate::{
    classifier::LogClassifier,
    collaborators::{MemorySink, PriceOracle, SignatureResolver},
    config::ChainConfig,
    engine::DedupEngine,
    processor::LogProcessor,
    registry::ChainState,
    types::{ProcessedTransaction, TransactionKind},
};

pub mod macros;
mod mock;

pub use mock::{MockChain, MockSubscriber};

pub const WATCHED_A: Address = address!("0x1111111111111111111111111111111111111111");
pub const WATCHED_B: Address = address!("0x2222222222222222222222222222222222222222");
pub const COUNTERPARTY: Address = address!("0x3333333333333333333333333333333333333333");

/// A valid chain configuration watching [`WATCHED_A`] and [`WATCHED_B`] with a one second block
/// time.
#[must_use]
pub fn chain_config(name: &str) -> ChainConfig {
    ChainConfig {
        name: name.to_string(),
        rpc_url: "http://localhost:8545".to_string(),
        ws_url: None,
        watched_addresses: vec![WATCHED_A, WATCHED_B],
        tokens: vec![],
        block_time_ms: 1_000,
    }
}

/// Deterministic transaction hash for test number `n`.
#[must_use]
pub fn tx_hash(n: u64) -> B256 {
    B256::from(U256::from(n))
}

#[must_use]
pub fn transfer_topic() -> B256 {
    keccak256("Transfer(address,address,uint256)")
}

#[must_use]
pub fn raw_log(
    contract: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: u64,
    tx: u64,
    log_index: u64,
) -> Log {
    Log {
        inner: primitives::Log { address: contract, data: LogData::new_unchecked(topics, data) },
        block_number: Some(block_number),
        transaction_hash: Some(tx_hash(tx)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// ERC-20 `Transfer` emitted by `contract`.
#[must_use]
pub fn transfer_log(
    contract: Address,
    from: Address,
    to: Address,
    value: U256,
    block_number: u64,
    tx: u64,
    log_index: u64,
) -> Log {
    raw_log(
        contract,
        vec![transfer_topic(), from.into_word(), to.into_word()],
        Bytes::from(value.to_be_bytes::<32>().to_vec()),
        block_number,
        tx,
        log_index,
    )
}

/// A transfer of one unit from [`COUNTERPARTY`] to [`WATCHED_B`], emitted by [`WATCHED_A`].
#[must_use]
pub fn log_at(block_number: u64, tx: u64, log_index: u64) -> Log {
    transfer_log(WATCHED_A, COUNTERPARTY, WATCHED_B, U256::from(1u64), block_number, tx, log_index)
}

#[must_use]
pub fn transaction_at(block_number: u64) -> ProcessedTransaction {
    ProcessedTransaction {
        timestamp: Utc::now(),
        chain: "ethereum".to_string(),
        kind: TransactionKind::Deposit,
        amount: U256::from(1u64),
        token_decimals: None,
        fiat_value: None,
        from: COUNTERPARTY,
        to: WATCHED_B,
        token_symbol: None,
        event_name: "Transfer".to_string(),
        tx_hash: tx_hash(block_number),
        block_number,
        log_index: 0,
        observed_wallet: WATCHED_B,
    }
}

/// A processor wired to a fresh chain state and an in-memory sink.
pub struct TestProcessor {
    pub state: Arc<ChainState>,
    pub sink: Arc<MemorySink>,
    pub processor: LogProcessor,
}

/// Builds a [`TestProcessor`] whose watermark starts at `watermark` (0 leaves it uninitialized).
#[must_use]
pub fn processor_for(config: ChainConfig, watermark: u64) -> TestProcessor {
    processor_with_engine(config, watermark, DedupEngine::default())
}

#[must_use]
pub fn processor_with_engine(
    config: ChainConfig,
    watermark: u64,
    engine: DedupEngine,
) -> TestProcessor {
    let state = Arc::new(ChainState::new(Arc::new(config)));
    state.observe_head(watermark);
    let sink = Arc::new(MemorySink::new(10_000));
    let classifier =
        LogClassifier::new(Arc::new(PriceOracle::new()), Arc::new(SignatureResolver::new()));
    let processor = LogProcessor::new(Arc::clone(&state), engine, classifier, sink.clone());
    TestProcessor { state, sink, processor }
}

/// `(block_number, log_index)` of every transaction stored in `sink`, in emission order.
#[must_use]
pub fn emitted(sink: &MemorySink) -> Vec<(u64, u64)> {
    sink.transactions().iter().map(|tx| (tx.block_number, tx.log_index)).collect()
}
