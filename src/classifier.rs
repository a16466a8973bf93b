//! Turns one raw log into a [`ProcessedTransaction`].
//!
//! Standard token events are decoded from their topics and data; anything else is read
//! positionally (topics 1 and 2 as counterparties when they hold an address, the first data word
//! as the amount). Enrichment failures degrade to missing fields and never drop the record.

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use chrono::Utc;

use crate::{
    collaborators::{PriceOracle, SignatureResolver, UNKNOWN_EVENT},
    config::ChainConfig,
    types::{ProcessedTransaction, TransactionKind},
};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
    event Approval(address indexed owner, address indexed spender, uint256 value);
    event Deposit(address indexed dst, uint256 wad);
    event Withdrawal(address indexed src, uint256 wad);
}

const BUILTIN_EVENTS: [(B256, &str); 4] = [
    (Transfer::SIGNATURE_HASH, "Transfer"),
    (Approval::SIGNATURE_HASH, "Approval"),
    (Deposit::SIGNATURE_HASH, "Deposit"),
    (Withdrawal::SIGNATURE_HASH, "Withdrawal"),
];

#[derive(Debug, PartialEq, Eq)]
struct Movement {
    from: Address,
    to: Address,
    amount: U256,
}

/// Classifies logs using the shared price and signature services.
#[derive(Clone)]
pub struct LogClassifier {
    prices: Arc<PriceOracle>,
    signatures: Arc<SignatureResolver>,
}

impl LogClassifier {
    #[must_use]
    pub fn new(prices: Arc<PriceOracle>, signatures: Arc<SignatureResolver>) -> Self {
        Self { prices, signatures }
    }

    pub async fn classify(&self, config: &ChainConfig, log: &Log) -> ProcessedTransaction {
        let topic0 = log.topics().first().copied();
        let Movement { from, to, amount } = decode(topic0, log);

        let (kind, observed_wallet) = if config.is_watched(&to) {
            (TransactionKind::Deposit, to)
        } else if config.is_watched(&from) {
            (TransactionKind::Withdrawal, from)
        } else {
            (TransactionKind::Transfer, log.address())
        };

        let token = config.token(&log.address());
        let fiat_value = match token {
            Some(token) => self.prices.fiat_value(&token.symbol, amount, token.decimals).await,
            None => None,
        };

        ProcessedTransaction {
            timestamp: Utc::now(),
            chain: config.name.clone(),
            kind,
            amount,
            token_decimals: token.map(|token| token.decimals),
            fiat_value,
            from,
            to,
            token_symbol: token.map(|token| token.symbol.clone()),
            event_name: self.event_name(topic0).await,
            tx_hash: log.transaction_hash.unwrap_or_default(),
            block_number: log.block_number.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            observed_wallet,
        }
    }

    async fn event_name(&self, topic0: Option<B256>) -> String {
        let Some(topic0) = topic0 else {
            return UNKNOWN_EVENT.to_string();
        };
        match BUILTIN_EVENTS.iter().find(|(hash, _)| *hash == topic0) {
            Some((_, name)) => (*name).to_string(),
            None => self.signatures.resolve(topic0).await,
        }
    }
}

fn decode(topic0: Option<B256>, log: &Log) -> Movement {
    let topics = log.topics();
    let address_at = |index: usize| topic_address(topics, index).unwrap_or(Address::ZERO);

    match topic0 {
        Some(hash) if hash == Transfer::SIGNATURE_HASH => Movement {
            from: address_at(1),
            to: address_at(2),
            // ERC-721 indexes the token id
            amount: match topics.get(3) {
                Some(token_id) => U256::from_be_bytes(token_id.0),
                None => first_word(log),
            },
        },
        Some(hash) if hash == Deposit::SIGNATURE_HASH => {
            Movement { from: Address::ZERO, to: address_at(1), amount: first_word(log) }
        }
        Some(hash) if hash == Withdrawal::SIGNATURE_HASH => {
            Movement { from: address_at(1), to: Address::ZERO, amount: first_word(log) }
        }
        _ => Movement { from: address_at(1), to: address_at(2), amount: first_word(log) },
    }
}

/// The address stored in a topic, if the topic is left-padded like an address.
fn topic_address(topics: &[B256], index: usize) -> Option<Address> {
    let word = topics.get(index)?;
    word[..12].iter().all(|byte| *byte == 0).then(|| Address::from_word(*word))
}

fn first_word(log: &Log) -> U256 {
    let data = &log.data().data;
    U256::from_be_slice(&data[..data.len().min(32)])
}
