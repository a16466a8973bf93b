use std::time::Duration;

use alloy::{
    network::{Ethereum, Network},
    providers::RootProvider,
};
use tracing::debug;

use crate::rpc::{Error, RobustProvider};

/// Default timeout for a single RPC call, retries included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries on each endpoint before moving to the next one.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default delay before the first retry; later retries back off exponentially.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);

/// Configures the endpoints, timeout and retry schedule of a [`RobustProvider`].
pub struct RobustProviderBuilder<N: Network = Ethereum> {
    primary_provider: RootProvider<N>,
    fallback_providers: Vec<RootProvider<N>>,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
}

impl<N: Network> RobustProviderBuilder<N> {
    /// Starts from an already connected primary endpoint.
    #[must_use]
    pub fn new(provider: RootProvider<N>) -> Self {
        Self {
            primary_provider: provider,
            fallback_providers: vec![],
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }

    /// Connect the primary provider from an `http(s)://`, `ws(s)://` or IPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be parsed or (for WebSocket/IPC) dialed.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        Ok(Self::new(RootProvider::connect(url).await?))
    }

    /// Single attempt per endpoint; only the call timeout and the fallbacks apply.
    #[must_use]
    pub fn fragile(provider: RootProvider<N>) -> Self {
        Self::new(provider).max_retries(0).min_delay(Duration::ZERO)
    }

    /// Fallbacks are tried in insertion order when the primary fails.
    #[must_use]
    pub fn fallback(mut self, provider: RootProvider<N>) -> Self {
        self.fallback_providers.push(provider);
        self
    }

    /// Connects `url` and adds it as a fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be parsed or dialed.
    pub async fn fallback_url(self, url: &str) -> Result<Self, Error> {
        Ok(self.fallback(RootProvider::connect(url).await?))
    }

    /// Time allowed per endpoint for one call, retries included.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    #[must_use]
    pub fn build(self) -> RobustProvider<N> {
        debug!(
            call_timeout_ms = self.call_timeout.as_millis(),
            max_retries = self.max_retries,
            fallback_count = self.fallback_providers.len(),
            "Building RobustProvider"
        );

        RobustProvider {
            primary_provider: self.primary_provider,
            fallback_providers: self.fallback_providers,
            call_timeout: self.call_timeout,
            max_retries: self.max_retries,
            min_delay: self.min_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallbacks_are_kept_in_order() -> anyhow::Result<()> {
        let primary = RootProvider::<Ethereum>::new_http("http://localhost:8545".parse()?);
        let first = RootProvider::<Ethereum>::new_http("http://localhost:8546".parse()?);
        let second = RootProvider::<Ethereum>::new_http("http://localhost:8547".parse()?);

        let robust = RobustProviderBuilder::new(primary)
            .fallback(first)
            .fallback(second)
            .call_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(robust.fallback_providers.len(), 2);
        assert_eq!(robust.call_timeout, Duration::from_secs(5));

        Ok(())
    }

    #[tokio::test]
    async fn fragile_disables_retries() -> anyhow::Result<()> {
        let primary = RootProvider::<Ethereum>::new_http("http://localhost:8545".parse()?);
        let robust = RobustProviderBuilder::fragile(primary).build();

        assert_eq!(robust.max_retries, 0);
        assert_eq!(robust.min_delay, Duration::ZERO);

        Ok(())
    }
}
