//! Market data
//!
//! `MarketDataProvider` is the quote capability. `MarketData` is what
//! handlers hold: a provider, the retry policy, and a TTL cache owned by the
//! caller rather than by the provider.

use crate::error::AssistantError;
use crate::retry::RetryPolicy;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change: f64,
    #[serde(default, alias = "changePercent")]
    pub change_percent: f64,
    #[serde(default = "Utc::now", alias = "asOf")]
    pub as_of: DateTime<Utc>,
}

/// Quote lookup. Unknown symbols are `NotFound`; transport problems are
/// `Network`.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn get_quote(&self, symbol: &str) -> Result<Quote>;
}

/// JSON quote service: `GET {base}/api/v1/quote/{symbol}`.
pub struct HttpMarketDataProvider {
    client: Client,
    base_url: String,
}

impl HttpMarketDataProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/api/v1/quote/{}", self.base_url, symbol);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AssistantError::Timeout(format!("Quote request for {} timed out", symbol))
            } else {
                AssistantError::Network(format!("Quote request for {} failed: {}", symbol, e))
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(AssistantError::NotFound(format!("Unknown symbol {}", symbol)))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AssistantError::RateLimited(format!(
                    "Quote service throttled {}",
                    symbol
                )))
            }
            status if status.is_server_error() => {
                return Err(AssistantError::Network(format!(
                    "Quote service returned {} for {}",
                    status, symbol
                )))
            }
            status if !status.is_success() => {
                return Err(AssistantError::Provider(format!(
                    "Quote service returned {} for {}",
                    status, symbol
                )))
            }
            _ => {}
        }

        response
            .json::<Quote>()
            .await
            .map_err(|e| AssistantError::Network(format!("Invalid quote payload: {}", e)))
    }
}

//
// ================= Caller-owned cache =================
//

pub struct QuoteCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Quote)>>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<Quote> {
        let entries = self.entries.read().await;
        entries
            .get(symbol)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, quote)| quote.clone())
    }

    /// Stores a quote and drops every entry that has outlived the TTL.
    pub async fn put(&self, quote: Quote) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        entries.insert(quote.symbol.clone(), (Instant::now(), quote));
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Provider + cache + retry policy, as used by handlers.
pub struct MarketData {
    provider: Arc<dyn MarketDataProvider>,
    cache: QuoteCache,
    policy: RetryPolicy,
}

impl MarketData {
    pub fn new(provider: Arc<dyn MarketDataProvider>, cache_ttl: Duration, policy: RetryPolicy) -> Self {
        Self {
            provider,
            cache: QuoteCache::new(cache_ttl),
            policy,
        }
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        if let Some(quote) = self.cache.get(symbol).await {
            debug!(symbol, "Quote served from cache");
            return Ok(quote);
        }

        let provider = &self.provider;
        let quote = self
            .policy
            .run("market.get_quote", || provider.get_quote(symbol))
            .await?;
        self.cache.put(quote.clone()).await;
        Ok(quote)
    }

    /// Quotes for several symbols; one failure does not sink the rest.
    pub async fn quotes(&self, symbols: &[String]) -> Vec<(String, Result<Quote>)> {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = self.quote(symbol).await;
            if let Err(e) = &result {
                warn!(symbol = %symbol, "Quote lookup failed: {}", e);
            }
            results.push((symbol.clone(), result));
        }
        results
    }
}

/// One line per quote, used as structured context.
pub fn format_quote(quote: &Quote) -> String {
    format!(
        "{}: ${:.2} ({:+.2}, {:+.2}%) as of {}",
        quote.symbol,
        quote.price,
        quote.change,
        quote.change_percent,
        quote.as_of.format("%Y-%m-%d %H:%M UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticMarket;

    fn market(provider: Arc<StaticMarket>) -> MarketData {
        MarketData::new(
            provider,
            Duration::from_secs(60),
            RetryPolicy::no_retry(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_quote_is_cached() {
        let provider = Arc::new(StaticMarket::new(&[("AAPL", 190.0)]));
        let market = market(provider.clone());

        let first = market.quote("AAPL").await.unwrap();
        let second = market.quote("AAPL").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let provider = Arc::new(StaticMarket::new(&[("AAPL", 190.0)]));
        let market = MarketData::new(
            provider.clone(),
            Duration::ZERO,
            RetryPolicy::no_retry(Duration::from_secs(1)),
        );

        market.quote("AAPL").await.unwrap();
        market.quote("AAPL").await.unwrap();

        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_put_purges_expired_entries() {
        let quote = |symbol: &str| -> Quote {
            serde_json::from_str(&format!(
                r#"{{"symbol":"{}","price":1.0,"change":0.0,"changePercent":0.0}}"#,
                symbol
            ))
            .unwrap()
        };

        let expiring = QuoteCache::new(Duration::ZERO);
        for symbol in ["AAA", "BBB", "CCC", "DDD"] {
            expiring.put(quote(symbol)).await;
        }
        assert_eq!(expiring.entry_count().await, 1);

        let fresh = QuoteCache::new(Duration::from_secs(60));
        for symbol in ["AAA", "BBB", "CCC"] {
            fresh.put(quote(symbol)).await;
        }
        assert_eq!(fresh.entry_count().await, 3);
        assert!(fresh.get("BBB").await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let market = market(Arc::new(StaticMarket::new(&[("AAPL", 190.0)])));
        let results = market.quotes(&["AAPL".to_string(), "ZZZZ".to_string()]).await;

        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(AssistantError::NotFound(_))));
    }

    #[test]
    fn test_quote_payload_accepts_camel_case() {
        let quote: Quote = serde_json::from_str(
            r#"{"symbol":"MSFT","price":410.5,"change":-2.1,"changePercent":-0.51}"#,
        )
        .unwrap();
        assert_eq!(quote.change_percent, -0.51);
        assert!(format_quote(&quote).starts_with("MSFT: $410.50 (-2.10, -0.51%)"));
    }
}
