//! Quote abstractions shared by the conversion engine and rate sources

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Price of the base asset in each quote currency, keyed by trading pair.
pub type QuoteMap = HashMap<String, f64>;

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Returns the current quotes, refreshing them when stale or when
    /// `force_refresh` is set.
    async fn get_quotes(&self, force_refresh: bool) -> Result<QuoteMap>;

    /// Sorted display codes for every tradable pair.
    async fn supported_currencies(&self) -> Vec<String>;
}
