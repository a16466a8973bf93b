use std::{collections::HashMap, sync::Arc};

use alloy::primitives::B256;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::collaborators::LookupError;

/// Label used when no source can name an event.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Maps a topic-0 hash to a human readable event name.
#[async_trait]
pub trait SignatureSource: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, topic0: B256) -> Result<String, LookupError>;
}

/// Fixed signature table.
#[derive(Clone, Debug, Default)]
pub struct StaticSignatures {
    names: HashMap<B256, String>,
}

impl StaticSignatures {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, topic0: B256, name: impl Into<String>) -> Self {
        self.names.insert(topic0, name.into());
        self
    }
}

#[async_trait]
impl SignatureSource for StaticSignatures {
    fn name(&self) -> &str {
        "static"
    }

    async fn lookup(&self, topic0: B256) -> Result<String, LookupError> {
        self.names.get(&topic0).cloned().ok_or_else(|| LookupError::NotFound(topic0.to_string()))
    }
}

/// Cache, then each source in order, then [`UNKNOWN_EVENT`]. Never fails.
#[derive(Default)]
pub struct SignatureResolver {
    sources: Vec<Arc<dyn SignatureSource>>,
    cache: DashMap<B256, String>,
}

impl SignatureResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn source(mut self, source: Arc<dyn SignatureSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub async fn resolve(&self, topic0: B256) -> String {
        if let Some(name) = self.cache.get(&topic0) {
            return name.value().clone();
        }

        for source in &self.sources {
            match source.lookup(topic0).await {
                Ok(name) => {
                    self.cache.insert(topic0, name.clone());
                    return name;
                }
                Err(e) => debug!(source = source.name(), %topic0, error = %e, "Signature lookup failed"),
            }
        }

        UNKNOWN_EVENT.to_string()
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SignatureSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn lookup(&self, _topic0: B256) -> Result<String, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Swap".into())
        }
    }

    #[tokio::test]
    async fn resolved_names_are_cached() {
        let source = Arc::new(Counting { calls: AtomicUsize::new(0) });
        let resolver = SignatureResolver::new().source(source.clone());
        let topic0 = B256::repeat_byte(0x11);

        assert_eq!(resolver.resolve(topic0).await, "Swap");
        assert_eq!(resolver.resolve(topic0).await, "Swap");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn tries_sources_in_order_then_unknown() {
        let known = B256::repeat_byte(0x22);
        let resolver = SignatureResolver::new()
            .source(Arc::new(StaticSignatures::new()))
            .source(Arc::new(StaticSignatures::new().with(known, "Sync")));

        assert_eq!(resolver.resolve(known).await, "Sync");
        assert_eq!(resolver.resolve(B256::repeat_byte(0x33)).await, UNKNOWN_EVENT);
        assert_eq!(resolver.cached(), 1);
    }
}
