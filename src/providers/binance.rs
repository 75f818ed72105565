use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::{AppConfig, BinanceProviderConfig, CacheConfig};
use crate::core::currency::currency_for_pair;
use crate::core::rates::{QuoteMap, QuoteSource};

struct CachedQuotes {
    quotes: QuoteMap,
    fetched_at: DateTime<Utc>,
}

struct ValidatedPairs {
    pairs: Vec<String>,
    validated_at: DateTime<Utc>,
}

fn is_fresh(since: DateTime<Utc>, ttl: TimeDelta) -> bool {
    Utc::now().signed_duration_since(since) < ttl
}

fn ttl_from_secs(secs: u64) -> TimeDelta {
    TimeDelta::from_std(Duration::from_secs(secs)).unwrap_or(TimeDelta::MAX)
}

/// BTC quotes from the Binance REST API.
///
/// Holds two independently timed caches: the list of candidate pairs confirmed
/// tradable on the exchange, and the last complete set of quotes. A refresh
/// either replaces the quote set as a whole or leaves it untouched.
///
/// Refresh cycles run on their own task, so a caller that gives up waiting
/// does not abort the cycle; its result still lands in the cache.
pub struct BinanceRateSource {
    state: Arc<SourceState>,
}

struct SourceState {
    base_url: String,
    candidate_pairs: Vec<String>,
    timeout: Duration,
    max_idle_connections: usize,
    max_connections: usize,
    quote_ttl: TimeDelta,
    validation_ttl: TimeDelta,
    client: Mutex<Option<reqwest::Client>>,
    client_builds: AtomicUsize,
    quotes: RwLock<Option<CachedQuotes>>,
    validated: RwLock<Option<ValidatedPairs>>,
}

impl BinanceRateSource {
    pub fn new(
        provider: &BinanceProviderConfig,
        cache: &CacheConfig,
        candidate_pairs: Vec<String>,
    ) -> Self {
        let state = SourceState {
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            candidate_pairs,
            timeout: provider.timeout(),
            max_idle_connections: provider.max_idle_connections,
            max_connections: provider.max_connections.max(1),
            quote_ttl: ttl_from_secs(cache.quote_ttl_secs),
            validation_ttl: ttl_from_secs(cache.validation_ttl_secs),
            client: Mutex::new(None),
            client_builds: AtomicUsize::new(0),
            quotes: RwLock::new(None),
            validated: RwLock::new(None),
        };
        BinanceRateSource {
            state: Arc::new(state),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.providers.binance,
            &config.cache,
            config.pairs.clone(),
        )
    }

    /// Releases the connection pool. A later fetch builds a new one.
    pub async fn close(&self) {
        if self.state.client.lock().await.take().is_some() {
            info!("Closed Binance HTTP client");
        }
    }

    /// Candidate pairs currently tradable on the exchange, in candidate order.
    ///
    /// A successful check is reused for the validation TTL. When the exchange
    /// cannot be queried the full candidate list is returned and nothing is
    /// cached, so the next call tries again.
    pub async fn validate_pairs(&self) -> Vec<String> {
        self.state.validate_pairs().await
    }

    async fn spawn_refresh(&self) -> Result<QuoteMap> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move { state.refresh_quotes().await })
            .await
            .context("Refresh task failed")?
    }

    #[cfg(test)]
    async fn has_client(&self) -> bool {
        self.state.client.lock().await.is_some()
    }

    #[cfg(test)]
    fn client_builds(&self) -> usize {
        self.state.client_builds.load(Ordering::SeqCst)
    }
}

impl SourceState {
    /// Returns the shared HTTP client, building it on first use.
    async fn client(&self) -> Result<reqwest::Client> {
        let mut client = self.client.lock().await;
        if let Some(client) = client.as_ref() {
            return Ok(client.clone());
        }
        let created = reqwest::Client::builder()
            .user_agent("btcfx/1.0")
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_idle_connections)
            .build()
            .context("Failed to build HTTP client")?;
        let builds = self.client_builds.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(builds, "Created Binance HTTP client");
        *client = Some(created.clone());
        Ok(created)
    }

    async fn validate_pairs(&self) -> Vec<String> {
        if let Some(cached) = self.validated.read().await.as_ref()
            && is_fresh(cached.validated_at, self.validation_ttl)
        {
            debug!("Using cached pair validation");
            return cached.pairs.clone();
        }

        let now = Utc::now();
        match self.fetch_tradable_symbols().await {
            Ok(tradable) => {
                let pairs: Vec<String> = self
                    .candidate_pairs
                    .iter()
                    .filter(|pair| tradable.contains(pair.as_str()))
                    .cloned()
                    .collect();
                info!(
                    "Validated {} BTC pairs out of {} requested",
                    pairs.len(),
                    self.candidate_pairs.len()
                );
                *self.validated.write().await = Some(ValidatedPairs {
                    pairs: pairs.clone(),
                    validated_at: now,
                });
                pairs
            }
            Err(e) => {
                error!("Error validating supported pairs: {:#}", e);
                self.candidate_pairs.clone()
            }
        }
    }

    async fn fetch_tradable_symbols(&self) -> Result<HashSet<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        debug!("Requesting exchange info from {}", url);

        let client = self.client().await?;
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request error for URL: {url}"))?
            .error_for_status()
            .with_context(|| format!("HTTP error for URL: {url}"))?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {url}"))?;
        let info: ExchangeInfoResponse = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse exchange info from {url}"))?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| s.symbol)
            .collect())
    }

    #[instrument(name = "BinancePriceFetch", skip(self, client))]
    async fn fetch_price(&self, client: &reqwest::Client, pair: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, pair);

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for pair: {}", e, pair))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for pair: {}",
                response.status(),
                pair
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response for {}: {}", pair, e))?;
        let data: TickerPriceResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;

        let price = data.price.parse()?;
        debug!(price, "Fetched price");
        Ok(price)
    }

    async fn refresh_quotes(&self) -> Result<QuoteMap> {
        let started = Utc::now();
        let pairs = self.validate_pairs().await;
        let client = self.client().await?;
        let client = &client;

        // Every fetch runs to completion; a failure only drops its own pair.
        let results: Vec<Option<(String, f64)>> = stream::iter(pairs)
            .map(|pair| async move {
                match self.fetch_price(client, &pair).await {
                    Ok(price) => Some((pair, price)),
                    Err(e) => {
                        warn!("Failed to fetch {}: {:#}", pair, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.max_connections)
            .collect()
            .await;

        let quotes: QuoteMap = results.into_iter().flatten().collect();
        if quotes.is_empty() {
            return Err(anyhow!("No BTC rates could be fetched from Binance"));
        }

        *self.quotes.write().await = Some(CachedQuotes {
            quotes: quotes.clone(),
            fetched_at: started,
        });
        info!("Fetched {} BTC rates from Binance", quotes.len());
        Ok(quotes)
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: PriceField,
}

/// Binance sends prices as decimal strings; plain numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceField {
    Text(String),
    Number(f64),
}

impl PriceField {
    fn parse(&self) -> Result<f64> {
        match self {
            PriceField::Number(price) => Ok(*price),
            PriceField::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid price '{}': {}", text, e)),
        }
    }
}

#[async_trait]
impl QuoteSource for BinanceRateSource {
    async fn get_quotes(&self, force_refresh: bool) -> Result<QuoteMap> {
        if !force_refresh
            && let Some(cached) = self.state.quotes.read().await.as_ref()
            && is_fresh(cached.fetched_at, self.state.quote_ttl)
        {
            debug!("Using cached BTC rates");
            return Ok(cached.quotes.clone());
        }

        match self.spawn_refresh().await {
            Ok(quotes) => Ok(quotes),
            Err(e) => {
                error!("Error fetching BTC prices: {:#}", e);
                if let Some(cached) = self.state.quotes.read().await.as_ref() {
                    warn!("Falling back to cached rates");
                    return Ok(cached.quotes.clone());
                }
                Err(e)
            }
        }
    }

    async fn supported_currencies(&self) -> Vec<String> {
        let mut currencies: Vec<String> = self
            .validate_pairs()
            .await
            .iter()
            .map(|pair| currency_for_pair(pair))
            .filter(|code| !code.is_empty())
            .collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }
}
