#![allow(dead_code)]

use std::time::Duration;

use chain_log_monitor::{
    BackfillCoordinator, BackoffPolicy, DedupEngine, RangeExecutor, SubscriptionManager,
    test_utils::{MockChain, MockSubscriber, TestProcessor, chain_config, processor_with_engine},
};

/// One chain's processing pipeline over a scripted chain.
pub struct Harness {
    pub chain: MockChain,
    pub test: TestProcessor,
    pub executor: RangeExecutor<MockChain>,
}

impl Harness {
    pub fn new(head: u64, watermark: u64) -> Self {
        Self::with_engine(head, watermark, DedupEngine::default(), 100)
    }

    pub fn with_engine(head: u64, watermark: u64, engine: DedupEngine, max_block_range: u64) -> Self {
        let chain = MockChain::new(head);
        let test = processor_with_engine(chain_config("ethereum"), watermark, engine);
        let executor =
            RangeExecutor::new(chain.clone(), test.state.config().log_filter(), max_block_range);
        Self { chain, test, executor }
    }

    pub fn coordinator(&self, max_window: u64) -> BackfillCoordinator<MockChain> {
        BackfillCoordinator::new(self.test.processor.clone(), self.executor.clone())
            .max_window(max_window)
            .backoff(fast_backoff())
    }

    pub fn live_feed(
        &self,
        subscriber: Option<MockSubscriber>,
    ) -> SubscriptionManager<MockChain, MockSubscriber> {
        SubscriptionManager::new(self.test.processor.clone(), self.executor.clone(), subscriber)
            .poll_interval(Duration::from_millis(20))
            .backoff(fast_backoff())
    }
}

pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::default()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .jitter(Duration::ZERO, Duration::ZERO)
}
