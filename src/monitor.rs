//! Process-level entry point: one supervisor per configured chain.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    collaborators::Collaborators,
    config::{ChainConfig, MonitorConfig, MonitorSettings},
    error::MonitorError,
    registry::ChainRegistry,
    rpc::{ChainClient, Error, LogSubscriber, RobustProvider, RobustProviderBuilder, WsLogSubscriber},
    supervisor::{ChainSupervisor, SupervisorHandle},
};

/// Builds the network clients of a chain.
pub trait ClientFactory: Send + Sync {
    type Client: ChainClient;
    type Subscriber: LogSubscriber;

    /// Returns the request client and, when the chain has a push endpoint, the subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC endpoint cannot be reached.
    fn connect(
        &self,
        config: &ChainConfig,
        settings: &MonitorSettings,
    ) -> impl Future<Output = Result<(Self::Client, Option<Self::Subscriber>), Error>> + Send;
}

/// Connects chains through [`RobustProvider`] and [`WsLogSubscriber`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AlloyClientFactory;

impl ClientFactory for AlloyClientFactory {
    type Client = RobustProvider;
    type Subscriber = WsLogSubscriber;

    async fn connect(
        &self,
        config: &ChainConfig,
        settings: &MonitorSettings,
    ) -> Result<(RobustProvider, Option<WsLogSubscriber>), Error> {
        let provider: RobustProvider = RobustProviderBuilder::connect(&config.rpc_url)
            .await?
            .call_timeout(settings.call_timeout())
            .max_retries(settings.max_rpc_retries)
            .build();
        let subscriber = config.ws_url.as_deref().map(WsLogSubscriber::new);
        Ok((provider, subscriber))
    }
}

/// A set of running chain workers sharing one registry and one set of collaborators.
pub struct Monitor {
    registry: Arc<ChainRegistry>,
    cancel: CancellationToken,
    handles: Vec<SupervisorHandle>,
}

impl Monitor {
    /// Starts a worker for every chain that validates and connects. Chains that do not are
    /// logged and skipped; they are not retried.
    ///
    /// # Errors
    ///
    /// * [`MonitorError::Config`] if the shared settings are invalid or a chain name repeats.
    /// * [`MonitorError::NoChains`] if no chain could be started.
    pub async fn start<F: ClientFactory>(
        config: MonitorConfig,
        collaborators: Collaborators,
        factory: &F,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let MonitorConfig { settings, chains } = config;

        let registry = Arc::new(ChainRegistry::new());
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(chains.len());

        for chain in chains {
            if let Err(e) = chain.validate() {
                error!(chain = %chain.name, error = %e, "Invalid chain configuration, skipping");
                continue;
            }
            let (client, subscriber) = match factory.connect(&chain, &settings).await {
                Ok(clients) => clients,
                Err(e) => {
                    error!(chain = %chain.name, error = %e, "Failed to connect, skipping");
                    continue;
                }
            };

            let state = registry.get_or_create(Arc::new(chain));
            let supervisor = ChainSupervisor::new(
                state,
                client,
                subscriber,
                collaborators.clone(),
                settings.clone(),
            );
            handles.push(supervisor.spawn(&cancel));
        }

        if handles.is_empty() {
            return Err(MonitorError::NoChains);
        }
        info!(chains = handles.len(), "Monitor started");
        Ok(Self { registry, cancel, handles })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Names of the running chains, in start order.
    #[must_use]
    pub fn chains(&self) -> Vec<&str> {
        self.handles.iter().map(SupervisorHandle::chain).collect()
    }

    /// Token whose cancellation stops every chain.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops every chain and waits for their tasks.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        join_all(self.handles.into_iter().map(SupervisorHandle::shutdown)).await;
        info!("Monitor stopped");
    }
}
