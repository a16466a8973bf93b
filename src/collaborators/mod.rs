//! Services the classifier and the per-log path call into.
//!
//! These are interface boundaries: the crate ships simple in-memory implementations, production
//! deployments plug their own price feeds, signature databases and stores behind the traits.

use std::sync::Arc;

use thiserror::Error;

pub mod price;
pub mod signatures;
pub mod sink;

pub use price::{PriceOracle, PriceSource, StaticPrices};
pub use signatures::{SignatureResolver, SignatureSource, StaticSignatures, UNKNOWN_EVENT};
pub use sink::{LoggingSink, MemorySink, TransactionSink};

/// Failure of a single lookup source. Never fatal: callers move on to the next source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{0} has no entry")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// The external services one monitor talks to, shared by every chain.
#[derive(Clone)]
pub struct Collaborators {
    pub sink: Arc<dyn TransactionSink>,
    pub prices: Arc<PriceOracle>,
    pub signatures: Arc<SignatureResolver>,
}

impl Collaborators {
    #[must_use]
    pub fn new(sink: Arc<dyn TransactionSink>) -> Self {
        Self {
            sink,
            prices: Arc::new(PriceOracle::default()),
            signatures: Arc::new(SignatureResolver::default()),
        }
    }

    #[must_use]
    pub fn with_prices(mut self, prices: PriceOracle) -> Self {
        self.prices = Arc::new(prices);
        self
    }

    #[must_use]
    pub fn with_signatures(mut self, signatures: SignatureResolver) -> Self {
        self.signatures = Arc::new(signatures);
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(LoggingSink))
    }
}
