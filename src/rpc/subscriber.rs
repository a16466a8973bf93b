use std::time::Duration;

use alloy::{
    providers::{Provider, RootProvider},
    rpc::types::Filter,
};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::rpc::{Error, LogStream, LogSubscriber};

/// Default time allowed for dialing the push endpoint and registering the filter.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Push subscriber that dials a fresh WebSocket connection for every subscription attempt.
///
/// The connection lives as long as the returned [`LogStream`]; dropping the stream closes it.
#[derive(Clone, Debug)]
pub struct WsLogSubscriber {
    url: String,
    dial_timeout: Duration,
}

impl WsLogSubscriber {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), dial_timeout: DEFAULT_DIAL_TIMEOUT }
    }

    /// Set the time allowed for dialing and subscribing.
    #[must_use]
    pub fn dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl LogSubscriber for WsLogSubscriber {
    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream, Error> {
        debug!(url = %self.url, "Dialing push endpoint");

        let provider: RootProvider = timeout(self.dial_timeout, RootProvider::connect(&self.url))
            .await??;
        let subscription = timeout(self.dial_timeout, provider.subscribe_logs(filter)).await??;

        info!(url = %self.url, "Log subscription established");

        // the stream owns the provider so the pubsub backend stays alive with it
        let stream = subscription.into_stream().map(move |log| {
            let _connection = &provider;
            Ok::<_, Error>(log)
        });

        Ok(Box::pin(stream))
    }
}
