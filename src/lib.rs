//! Chain-Log-Monitor turns the contract logs of one or more EVM chains into a deduplicated
//! stream of classified transactions.
//!
//! The main entry point is [`Monitor`], started from a [`MonitorConfig`] with a set of
//! [`Collaborators`] (sink, price oracle, signature resolver). Each chain runs under its own
//! [`ChainSupervisor`], made of three tasks:
//!
//! * the live feed ([`SubscriptionManager`]), preferring a push subscription and falling back to
//!   polling the chain head;
//! * the gap monitor ([`GapMonitor`]), raising a backfill request when the watermark lags the
//!   head;
//! * the backfill coordinator ([`BackfillCoordinator`]), recovering missed blocks one window at
//!   a time through the chunked [`RangeExecutor`].
//!
//! Every log, live or historical, goes through the same [`LogProcessor`]: the [`DedupEngine`]
//! decides under the chain lock whether it is new, a duplicate or evidence of a reorg, then
//! the [`LogClassifier`] builds the [`ProcessedTransaction`] handed to the sink.
//!
//! # Delivery
//!
//! Each `(block_number, tx_hash, log_index)` is emitted at most once per process. State lives in
//! memory only: nothing is persisted across restarts, and on startup the watermark is initialized
//! from the chain head rather than replaying history.
//!
//! # Reorgs
//!
//! A new log below the watermark is treated as a reorg signal: it is discarded and a recovery
//! from the block after the watermark (captured at that moment) is scheduled. Canonical chain
//! state is not recomputed; the RPC provider is trusted.
//!
//! # Example
//!
//! ```rust,no_run
//! use chain_log_monitor::{AlloyClientFactory, Collaborators, Monitor, MonitorConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MonitorConfig::from_path("monitor.json")?;
//! let monitor = Monitor::start(config, Collaborators::default(), &AlloyClientFactory).await?;
//!
//! tokio::signal::ctrl_c().await?;
//! monitor.shutdown().await;
//! # Ok(()) }
//! ```

pub mod backfill;
pub mod backoff;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod gap;
pub mod monitor;
pub mod processor;
pub mod range;
pub mod registry;
pub mod rpc;
pub mod subscription;
pub mod supervisor;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod types;

pub use backfill::{BackfillCoordinator, DEFAULT_MAX_BACKFILL_WINDOW, RecoveryOutcome};
pub use backoff::{Backoff, BackoffPolicy};
pub use classifier::LogClassifier;
pub use collaborators::Collaborators;
pub use config::{ChainConfig, ConfigError, MonitorConfig, MonitorSettings, TokenInfo};
pub use engine::{Admission, DedupEngine};
pub use error::MonitorError;
pub use gap::{GapCheck, GapMonitor};
pub use monitor::{AlloyClientFactory, ClientFactory, Monitor};
pub use processor::LogProcessor;
pub use range::{DEFAULT_MAX_BLOCK_RANGE, FetchReport, RangeExecutor};
pub use registry::{ChainRegistry, ChainSnapshot, ChainState, ChainStats, Recovery};
pub use subscription::SubscriptionManager;
pub use supervisor::{ChainSupervisor, SupervisorHandle};
pub use types::{DedupKey, ProcessedTransaction, TransactionKind};
