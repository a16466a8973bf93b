use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{U256, utils::format_units};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::collaborators::LookupError;

/// A fiat price feed keyed by token symbol.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fiat price of one whole token.
    async fn price(&self, symbol: &str) -> Result<f64, LookupError>;
}

/// Fixed price table.
#[derive(Clone, Debug, Default)]
pub struct StaticPrices {
    prices: HashMap<String, f64>,
}

impl StaticPrices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, symbol: impl Into<String>, price: f64) -> Self {
        self.prices.insert(symbol.into(), price);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPrices {
    fn name(&self) -> &str {
        "static"
    }

    async fn price(&self, symbol: &str) -> Result<f64, LookupError> {
        self.prices.get(symbol).copied().ok_or_else(|| LookupError::NotFound(symbol.to_string()))
    }
}

/// Ordered list of price sources; the first success wins. The last price obtained for a symbol
/// is kept and served when every source fails.
#[derive(Default)]
pub struct PriceOracle {
    sources: Vec<Arc<dyn PriceSource>>,
    last_known: DashMap<String, f64>,
}

impl PriceOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Price of one whole `symbol`, or `None` if no source knows it.
    pub async fn price(&self, symbol: &str) -> Option<f64> {
        for source in &self.sources {
            match source.price(symbol).await {
                Ok(price) => {
                    self.last_known.insert(symbol.to_string(), price);
                    return Some(price);
                }
                Err(e) => debug!(source = source.name(), symbol, error = %e, "Price source failed"),
            }
        }

        let cached = self.last_known.get(symbol).map(|entry| *entry.value());
        if cached.is_none() && !self.sources.is_empty() {
            warn!(symbol, "No price available");
        }
        cached
    }

    /// Fiat value of a raw on-chain `amount` with `decimals` decimals.
    pub async fn fiat_value(&self, symbol: &str, amount: U256, decimals: u8) -> Option<f64> {
        let price = self.price(symbol).await?;
        let units = format_units(amount, decimals).ok()?.parse::<f64>().ok()?;
        Some(units * price)
    }
}
