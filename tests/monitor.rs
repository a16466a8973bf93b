use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::transports::TransportErrorKind;
use chain_log_monitor::{
    ChainConfig, ClientFactory, Collaborators, ConfigError, Monitor, MonitorConfig, MonitorError,
    MonitorSettings, assert_emitted, assert_eventually,
    collaborators::MemorySink,
    rpc::Error,
    test_utils::{MockChain, MockSubscriber, WATCHED_A, chain_config, log_at},
};

/// Hands out pre-built mock clients by chain name; unknown chains fail to connect.
#[derive(Default)]
struct MockFactory {
    chains: HashMap<String, (MockChain, Option<MockSubscriber>)>,
}

impl MockFactory {
    fn with_chain(mut self, name: &str, chain: MockChain, subscriber: Option<MockSubscriber>) -> Self {
        self.chains.insert(name.to_string(), (chain, subscriber));
        self
    }
}

impl ClientFactory for MockFactory {
    type Client = MockChain;
    type Subscriber = MockSubscriber;

    async fn connect(
        &self,
        config: &ChainConfig,
        _settings: &MonitorSettings,
    ) -> Result<(MockChain, Option<MockSubscriber>), Error> {
        self.chains
            .get(&config.name)
            .cloned()
            .ok_or_else(|| TransportErrorKind::custom_str("connection refused").into())
    }
}

fn fast_settings() -> MonitorSettings {
    MonitorSettings { poll_interval_ms: 20, ..MonitorSettings::default() }
}

fn config(chains: Vec<ChainConfig>) -> MonitorConfig {
    MonitorConfig { settings: fast_settings(), chains }
}

#[tokio::test]
async fn invalid_and_unreachable_chains_are_skipped() -> anyhow::Result<()> {
    let mut broken = chain_config("broken");
    broken.watched_addresses = vec![WATCHED_A];
    let factory = MockFactory::default()
        .with_chain("ethereum", MockChain::new(100), None)
        .with_chain("broken", MockChain::new(100), None);

    let monitor = Monitor::start(
        config(vec![chain_config("ethereum"), broken, chain_config("offline")]),
        Collaborators::default(),
        &factory,
    )
    .await?;

    assert_eq!(monitor.chains(), vec!["ethereum"]);
    assert_eq!(monitor.registry().chains(), vec!["ethereum".to_string()]);
    monitor.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn start_fails_when_no_chain_can_run() {
    let started =
        Monitor::start(config(vec![chain_config("offline")]), Collaborators::default(), &MockFactory::default())
            .await;

    assert!(matches!(started, Err(MonitorError::NoChains)));
}

#[tokio::test]
async fn duplicate_chain_names_are_rejected() {
    let factory = MockFactory::default().with_chain("ethereum", MockChain::new(100), None);

    let started = Monitor::start(
        config(vec![chain_config("ethereum"), chain_config("ethereum")]),
        Collaborators::default(),
        &factory,
    )
    .await;

    assert!(matches!(
        started,
        Err(MonitorError::Config(ConfigError::DuplicateChain(name))) if name == "ethereum"
    ));
}

#[tokio::test]
async fn polled_chain_delivers_new_logs() -> anyhow::Result<()> {
    let chain = MockChain::new(100);
    let factory = MockFactory::default().with_chain("ethereum", chain.clone(), None);
    let sink = Arc::new(MemorySink::new(100));

    let monitor =
        Monitor::start(config(vec![chain_config("ethereum")]), Collaborators::new(sink.clone()), &factory)
            .await?;
    let state = monitor.registry().get("ethereum").expect("chain registered");
    assert_eventually!(state.last_processed_block() == 100);
    assert_eventually!(chain.head_calls() >= 3);

    chain.push_logs([log_at(101, 1, 0), log_at(103, 2, 0), log_at(103, 2, 1)]);
    chain.set_head(103);

    assert_eventually!(sink.len() == 3);
    assert_emitted!(sink, [(101, 0), (103, 0), (103, 1)]);
    assert_eventually!(state.last_processed_block() == 103);

    tokio::time::timeout(Duration::from_secs(2), monitor.shutdown()).await?;
    Ok(())
}

#[tokio::test]
async fn chains_progress_independently() -> anyhow::Result<()> {
    let healthy = MockChain::new(100);
    let stuck = MockChain::new(100);
    let subscriber = MockSubscriber::new();
    let factory = MockFactory::default()
        .with_chain("ethereum", healthy.clone(), Some(subscriber.clone()))
        .with_chain("polygon", stuck.clone(), None);
    let sink = Arc::new(MemorySink::new(100));

    let monitor = Monitor::start(
        config(vec![chain_config("ethereum"), chain_config("polygon")]),
        Collaborators::new(sink.clone()),
        &factory,
    )
    .await?;
    stuck.fail_next_heads(usize::MAX);
    assert_eventually!(subscriber.open_streams() == 1);
    assert_eventually!(monitor.registry().get("ethereum").is_some_and(|s| s.last_processed_block() == 100));

    subscriber.emit(&log_at(101, 1, 0));

    assert_eventually!(sink.len() == 1);
    let transaction = &sink.transactions()[0];
    assert_eq!(transaction.chain, "ethereum");
    assert_eq!(monitor.registry().snapshots().len(), 2);

    monitor.shutdown().await;
    Ok(())
}
