//! Network layer used by the per-chain workers.
//!
//! The monitor only needs three capabilities from a chain: read the current head, fetch logs for
//! a block range and (optionally) open a push subscription for new logs. They are expressed by the
//! [`ChainClient`] and [`LogSubscriber`] traits so the core can be driven by any backend.
//!
//! Two Alloy-backed implementations are provided:
//! * [`RobustProvider`], a wrapper around [`RootProvider`](alloy::providers::RootProvider) with
//!   per-call timeouts, exponential backoff retries and failover to fallback endpoints;
//! * [`WsLogSubscriber`], which dials a WebSocket endpoint for every subscription attempt.
//!
//! # Example
//!
//! ```rust,no_run
//! use chain_log_monitor::rpc::{ChainClient, RobustProviderBuilder};
//! use alloy::network::Ethereum;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = RobustProviderBuilder::<Ethereum>::connect("https://eth.example.org")
//!     .await?
//!     .fallback_url("https://eth-backup.example.org")
//!     .await?
//!     .call_timeout(Duration::from_secs(10))
//!     .build();
//!
//! let head = provider.block_number().await?;
//! println!("Current block: {head}");
//! # Ok(()) }
//! ```

use std::pin::Pin;

use alloy::rpc::types::{Filter, Log};
use tokio_stream::Stream;

pub mod builder;
pub mod error;
pub mod provider;
pub mod subscriber;

pub use builder::*;
pub use error::Error;
pub use provider::RobustProvider;
pub use subscriber::WsLogSubscriber;

/// Stream of logs delivered by a push subscription. The stream ends (or yields an error) when the
/// subscription is lost.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Log, Error>> + Send>>;

/// Request/response access to a chain.
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// Returns the current chain head.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be reached or rejects the request.
    fn block_number(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Returns every log matching `filter`. The filter always carries an explicit block range.
    ///
    /// # Errors
    ///
    /// Returns an error if the node rejects the query; see [`Error::is_range_too_large`].
    fn get_logs(&self, filter: &Filter) -> impl Future<Output = Result<Vec<Log>, Error>> + Send;
}

/// Push access to new logs.
pub trait LogSubscriber: Send + Sync + 'static {
    /// Opens a new subscription for logs matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be dialed or refuses the subscription.
    fn subscribe_logs(
        &self,
        filter: &Filter,
    ) -> impl Future<Output = Result<LogStream, Error>> + Send;
}
