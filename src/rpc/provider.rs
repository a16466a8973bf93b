use std::time::Duration;

use alloy::{
    network::{Ethereum, Network},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::rpc::{ChainClient, Error, error::is_range_too_large};

/// Provider wrapper with built-in retry, timeout and failover.
///
/// Every call is retried against the primary with exponential backoff, bounded by a total
/// timeout. If the primary keeps failing, the same call is tried on each fallback in the order
/// they were added. "Range too large" errors from `eth_getLogs` are returned immediately: retrying
/// the same range cannot succeed, the caller must shrink it.
#[derive(Clone, Debug)]
pub struct RobustProvider<N: Network = Ethereum> {
    pub(crate) primary_provider: RootProvider<N>,
    pub(crate) fallback_providers: Vec<RootProvider<N>>,
    pub(crate) call_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
}

impl<N: Network> RobustProvider<N> {
    #[must_use]
    pub fn primary(&self) -> &RootProvider<N> {
        &self.primary_provider
    }

    /// Number of endpoints tried by every call, primary included.
    #[must_use]
    pub fn endpoints(&self) -> usize {
        1 + self.fallback_providers.len()
    }

    /// `eth_blockNumber`.
    ///
    /// # Errors
    ///
    /// See [call errors](#call-errors).
    pub async fn get_block_number(&self) -> Result<u64, Error> {
        self.call("eth_blockNumber", |provider| async move { provider.get_block_number().await })
            .await
    }

    /// `eth_getLogs`.
    ///
    /// # Errors
    ///
    /// See [call errors](#call-errors).
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        let logs = self
            .call("eth_getLogs", move |provider| async move { provider.get_logs(filter).await })
            .await?;
        debug!(count = logs.len(), "eth_getLogs returned");
        Ok(logs)
    }

    /// Runs `operation` on the primary, then on each fallback in order, until one answers.
    ///
    /// # Errors
    /// <a name="call-errors"></a>
    ///
    /// * A range-too-large [`Error::RpcError`] as soon as any endpoint reports it.
    /// * [`Error::Timeout`] or [`Error::RpcError`] from the last endpoint otherwise.
    pub(crate) async fn call<T, F, Fut>(&self, method: &'static str, operation: F) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let endpoints = std::iter::once(&self.primary_provider).chain(&self.fallback_providers);
        let mut last_error = Error::Timeout;

        for (index, provider) in endpoints.enumerate() {
            match self.call_with_retry(provider, &operation).await {
                Ok(value) => {
                    if index > 0 {
                        info!(method, fallback = index, "Fallback provider answered");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_range_too_large() => return Err(e),
                Err(e) => {
                    warn!(method, endpoint = index, endpoints = self.endpoints(), error = %e, "RPC call failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        provider: &RootProvider<N>,
        operation: F,
    ) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let schedule = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        let attempts = (|| operation(provider.clone()))
            .retry(schedule)
            .when(|err: &RpcError<TransportErrorKind>| !is_range_too_large(err))
            .notify(|err: &RpcError<TransportErrorKind>, delay: Duration| {
                debug!(error = %err, delay_ms = delay.as_millis(), "Retrying RPC call");
            })
            .sleep(tokio::time::sleep);

        timeout(self.call_timeout, attempts).await?.map_err(Error::from)
    }
}

impl<N: Network> ChainClient for RobustProvider<N> {
    async fn block_number(&self) -> Result<u64, Error> {
        self.get_block_number().await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        RobustProvider::get_logs(self, filter).await
    }
}
