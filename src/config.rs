//! Per-chain and process-wide settings.
//!
//! Configuration is plain data deserialized with `serde`; every field of [`MonitorSettings`] has a
//! default so a config file only needs to list its chains. Call [`MonitorConfig::validate`] (or
//! [`ChainConfig::validate`] for one chain) before starting workers.

use std::{collections::HashSet, path::Path, time::Duration};

use alloy::{primitives::Address, rpc::types::Filter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    backoff::{self, BackoffPolicy},
    backfill::DEFAULT_MAX_BACKFILL_WINDOW,
    engine::{DEFAULT_DEDUP_THRESHOLD, DEFAULT_RETENTION_WINDOW},
    range::DEFAULT_MAX_BLOCK_RANGE,
    rpc,
};

/// Minimum number of watched addresses per chain.
pub const MIN_WATCHED_ADDRESSES: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Chain name must not be empty")]
    EmptyName,

    #[error("Chain {0}: RPC endpoint must not be empty")]
    MissingRpcUrl(String),

    #[error("Chain {chain}: at least {MIN_WATCHED_ADDRESSES} watched addresses are required, got {got}")]
    NotEnoughWatchedAddresses { chain: String, got: usize },

    #[error("Chain {0}: block time must be greater than 0")]
    InvalidBlockTime(String),

    #[error("Chain {0} is configured more than once")]
    DuplicateChain(String),

    #[error("{0} must be greater than 0")]
    InvalidSetting(&'static str),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// A token contract known to the classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything needed to run one chain worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain label, used as the registry key and in every log line.
    pub name: String,
    pub rpc_url: String,
    /// Optional push endpoint; when absent the chain is polled.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Contract addresses whose logs are ingested. Also used as the wallets that decide the
    /// direction of a transfer.
    pub watched_addresses: Vec<Address>,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    /// Expected block time, drives the gap monitor tick.
    pub block_time_ms: u64,
}

impl ChainConfig {
    #[must_use]
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    /// # Errors
    ///
    /// Returns the first problem found; see [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingRpcUrl(self.name.clone()));
        }
        let distinct: HashSet<_> = self.watched_addresses.iter().collect();
        if distinct.len() < MIN_WATCHED_ADDRESSES {
            return Err(ConfigError::NotEnoughWatchedAddresses {
                chain: self.name.clone(),
                got: distinct.len(),
            });
        }
        if self.block_time_ms == 0 {
            return Err(ConfigError::InvalidBlockTime(self.name.clone()));
        }
        Ok(())
    }

    /// Filter matching every log emitted by a watched address, all topics.
    #[must_use]
    pub fn log_filter(&self) -> Filter {
        Filter::new().address(self.watched_addresses.clone())
    }

    #[must_use]
    pub fn is_watched(&self, address: &Address) -> bool {
        self.watched_addresses.contains(address)
    }

    #[must_use]
    pub fn token(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.iter().find(|token| token.address == *address)
    }
}

fn default_max_block_range() -> u64 {
    DEFAULT_MAX_BLOCK_RANGE
}

fn default_max_backfill_window() -> u64 {
    DEFAULT_MAX_BACKFILL_WINDOW
}

fn default_dedup_threshold() -> usize {
    DEFAULT_DEDUP_THRESHOLD
}

fn default_retention_window() -> u64 {
    DEFAULT_RETENTION_WINDOW
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_gap_check_multiplier() -> u32 {
    2
}

fn default_max_reconnect_attempts() -> u32 {
    backoff::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

#[allow(clippy::cast_possible_truncation)]
fn default_call_timeout_ms() -> u64 {
    rpc::DEFAULT_CALL_TIMEOUT.as_millis() as u64
}

fn default_max_rpc_retries() -> usize {
    rpc::DEFAULT_MAX_RETRIES
}

fn default_sink_capacity() -> usize {
    10_000
}

/// Tunables shared by every chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Largest span of a single `eth_getLogs` request.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Largest span covered by one backfill window.
    #[serde(default = "default_max_backfill_window")]
    pub max_backfill_window: u64,
    /// Dedup set size above which inline eviction runs.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: usize,
    /// Number of blocks below the current log whose keys survive eviction.
    #[serde(default = "default_retention_window")]
    pub retention_window: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Gap check period as a multiple of the chain block time.
    #[serde(default = "default_gap_check_multiplier")]
    pub gap_check_multiplier: u32,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_max_rpc_retries")]
    pub max_rpc_retries: usize,
    /// Capacity of the in-memory sink used by the demo binary.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_block_range: default_max_block_range(),
            max_backfill_window: default_max_backfill_window(),
            dedup_threshold: default_dedup_threshold(),
            retention_window: default_retention_window(),
            poll_interval_ms: default_poll_interval_ms(),
            gap_check_multiplier: default_gap_check_multiplier(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            call_timeout_ms: default_call_timeout_ms(),
            max_rpc_retries: default_max_rpc_retries(),
            sink_capacity: default_sink_capacity(),
        }
    }
}

impl MonitorSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] naming the first zero-valued tunable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_block_range", self.max_block_range == 0),
            ("max_backfill_window", self.max_backfill_window == 0),
            ("dedup_threshold", self.dedup_threshold == 0),
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("gap_check_multiplier", self.gap_check_multiplier == 0),
            ("max_reconnect_attempts", self.max_reconnect_attempts == 0),
            ("call_timeout_ms", self.call_timeout_ms == 0),
            ("sink_capacity", self.sink_capacity == 0),
        ];
        match checks.into_iter().find(|(_, invalid)| *invalid) {
            Some((name, _)) => Err(ConfigError::InvalidSetting(name)),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::default().max_attempts(self.max_reconnect_attempts)
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub settings: MonitorSettings,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl MonitorConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `json` is not a valid configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validates the shared settings and checks chain names are unique. Individual chains are
    /// validated when the monitor starts so one bad chain does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.name.as_str()) {
                return Err(ConfigError::DuplicateChain(chain.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn chain() -> ChainConfig {
        ChainConfig {
            name: "ethereum".into(),
            rpc_url: "http://localhost:8545".into(),
            ws_url: None,
            watched_addresses: vec![
                address!("0x1111111111111111111111111111111111111111"),
                address!("0x2222222222222222222222222222222222222222"),
            ],
            tokens: vec![],
            block_time_ms: 12_000,
        }
    }

    #[test]
    fn valid_chain_passes() {
        assert!(chain().validate().is_ok());
    }

    #[test]
    fn rejects_a_single_watched_address() {
        let mut config = chain();
        config.watched_addresses.truncate(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotEnoughWatchedAddresses { got: 1, .. })
        ));
    }

    #[test]
    fn duplicate_addresses_count_once() {
        let mut config = chain();
        config.watched_addresses[1] = config.watched_addresses[0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_rpc_and_zero_block_time() {
        let mut config = chain();
        config.rpc_url = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::MissingRpcUrl(_))));

        let mut config = chain();
        config.block_time_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBlockTime(_))));
    }

    #[test]
    fn settings_default_when_omitted() -> anyhow::Result<()> {
        let config = MonitorConfig::from_json_str(
            r#"{
                "chains": [{
                    "name": "base",
                    "rpc_url": "http://localhost:8545",
                    "watched_addresses": [
                        "0x1111111111111111111111111111111111111111",
                        "0x2222222222222222222222222222222222222222"
                    ],
                    "tokens": [{
                        "address": "0x1111111111111111111111111111111111111111",
                        "symbol": "USDC",
                        "decimals": 6
                    }],
                    "block_time_ms": 2000
                }]
            }"#,
        )?;

        assert_eq!(config.settings, MonitorSettings::default());
        assert_eq!(config.settings.max_block_range, 100);
        assert_eq!(config.settings.max_backfill_window, 1000);
        let base = &config.chains[0];
        assert_eq!(base.ws_url, None);
        assert_eq!(
            base.token(&address!("0x1111111111111111111111111111111111111111"))
                .map(|token| token.symbol.as_str()),
            Some("USDC")
        );
        config.validate()?;
        Ok(())
    }

    #[test]
    fn rejects_zero_settings_and_duplicate_chains() {
        let mut config = MonitorConfig { settings: MonitorSettings::default(), chains: vec![chain(), chain()] };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateChain(_))));

        config.chains.pop();
        config.settings.max_block_range = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSetting("max_block_range"))));
    }

    #[test]
    fn filter_targets_every_watched_address() {
        let config = chain();
        let filter = config.log_filter();
        for address in &config.watched_addresses {
            assert!(filter.address.matches(address));
        }
    }
}
