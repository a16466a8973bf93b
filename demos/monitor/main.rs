use std::{sync::Arc, time::Duration};

use chain_log_monitor::{
    AlloyClientFactory, Collaborators, Monitor, MonitorConfig, ProcessedTransaction,
    collaborators::{LoggingSink, MemorySink, PriceOracle, StaticPrices, TransactionSink},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Logs every transaction and keeps the most recent ones for the periodic report.
struct RecordingSink {
    recent: Arc<MemorySink>,
}

impl TransactionSink for RecordingSink {
    fn emit(&self, transaction: ProcessedTransaction) {
        LoggingSink.emit(transaction.clone());
        self.recent.emit(transaction);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "demos/monitor/monitor.json".to_string());
    let config = MonitorConfig::from_path(&path)?;
    info!(path = %path, chains = config.chains.len(), "Loaded configuration");

    let prices = PriceOracle::new()
        .source(Arc::new(StaticPrices::new().with("USDC", 1.0).with("USDT", 1.0).with("DAI", 1.0)));
    let recent = Arc::new(MemorySink::new(config.settings.sink_capacity));
    let sink = RecordingSink { recent: Arc::clone(&recent) };
    let collaborators = Collaborators::new(Arc::new(sink)).with_prices(prices);

    let monitor = Monitor::start(config, collaborators, &AlloyClientFactory).await?;
    let mut report = tokio::time::interval(Duration::from_secs(30));
    report.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                info!(stored = recent.len(), evicted = recent.dropped(), "Recent transactions");
                for snapshot in monitor.registry().snapshots() {
                    info!(chain = %snapshot.chain, snapshot = %serde_json::to_string(&snapshot)?, "Chain status");
                }
            }
        }
    }

    info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}
