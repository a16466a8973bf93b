use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    backfill::BackfillCoordinator,
    collaborators::Collaborators,
    config::MonitorSettings,
    engine::DedupEngine,
    gap::GapMonitor,
    processor::LogProcessor,
    range::RangeExecutor,
    registry::ChainState,
    rpc::{ChainClient, LogSubscriber},
    subscription::SubscriptionManager,
};

/// Wires the live feed, the gap monitor and the backfill coordinator of one chain.
pub struct ChainSupervisor<C, S> {
    state: Arc<ChainState>,
    client: C,
    subscriber: Option<S>,
    collaborators: Collaborators,
    settings: MonitorSettings,
}

impl<C: ChainClient, S: LogSubscriber> ChainSupervisor<C, S> {
    #[must_use]
    pub fn new(
        state: Arc<ChainState>,
        client: C,
        subscriber: Option<S>,
        collaborators: Collaborators,
        settings: MonitorSettings,
    ) -> Self {
        Self { state, client, subscriber, collaborators, settings }
    }

    /// Starts the chain's tasks under a child of `parent`. Cancelling `parent` stops them too.
    #[must_use]
    pub fn spawn(self, parent: &CancellationToken) -> SupervisorHandle {
        let Self { state, client, subscriber, collaborators, settings } = self;
        let cancel = parent.child_token();

        let engine = DedupEngine::new(settings.dedup_threshold, settings.retention_window);
        let processor = LogProcessor::from_collaborators(Arc::clone(&state), engine, &collaborators);
        let executor =
            RangeExecutor::new(client.clone(), state.config().log_filter(), settings.max_block_range);

        let live = SubscriptionManager::new(processor.clone(), executor.clone(), subscriber)
            .poll_interval(settings.poll_interval())
            .backoff(settings.backoff_policy());
        let gaps = GapMonitor::new(Arc::clone(&state), client, settings.gap_check_multiplier);
        let backfill = BackfillCoordinator::new(processor, executor)
            .max_window(settings.max_backfill_window)
            .backoff(settings.backoff_policy());

        let mut tasks = JoinSet::new();
        tasks.spawn(live.run(cancel.clone()));
        tasks.spawn(gaps.run(cancel.clone()));
        tasks.spawn(backfill.run(cancel.clone()));

        info!(chain = %state.name(), "Chain supervisor started");
        SupervisorHandle { state, cancel, tasks }
    }
}

/// Owner of a running chain's tasks.
pub struct SupervisorHandle {
    state: Arc<ChainState>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl SupervisorHandle {
    #[must_use]
    pub fn chain(&self) -> &str {
        self.state.name()
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ChainState> {
        &self.state
    }

    /// Signals the chain's tasks to stop without waiting for them.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the chain's tasks and waits for all of them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(chain = %self.state.name(), error = %e, "Chain task ended abnormally");
            }
        }
        info!(chain = %self.state.name(), "Chain supervisor stopped");
    }
}
