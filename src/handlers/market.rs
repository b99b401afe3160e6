//! Market analysis

use crate::error::AssistantError;
use crate::handlers::{generate_answer, Handler, HandlerOutcome, HandlerRequest};
use crate::llm::TextGenerator;
use crate::market::{format_quote, MarketData};
use crate::models::IntentKind;
use crate::rag::{ContextBlock, StructuredData};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

const GUIDANCE: &str = "Role: market analyst.
- Describe what the quotes show without predicting prices
- Relate movements to broad economic context where the context supports it
- Remind the user that short-term moves are noisy";

pub const MARKET_UNAVAILABLE: &str = "Market data unavailable right now.";

pub struct MarketHandler {
    generator: TextGenerator,
    market: Option<Arc<MarketData>>,
    watchlist: Vec<String>,
}

impl MarketHandler {
    pub fn new(
        generator: TextGenerator,
        market: Option<Arc<MarketData>>,
        watchlist: Vec<String>,
    ) -> Self {
        Self {
            generator,
            market,
            watchlist,
        }
    }
}

#[async_trait]
impl Handler for MarketHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::Market
    }

    fn retrieval_focus(&self) -> Option<&str> {
        Some("market trends technical analysis economic indicators")
    }

    async fn gather(&self, request: &HandlerRequest<'_>) -> Result<Vec<StructuredData>> {
        let Some(market) = &self.market else {
            return Ok(vec![StructuredData::new("Market data", MARKET_UNAVAILABLE)]);
        };

        let params = &request.intent.parameters;
        let named = &params.symbols;
        let symbols = if named.is_empty() {
            &self.watchlist
        } else {
            named
        };

        let mut lines = Vec::new();
        for (symbol, quote) in market.quotes(symbols).await {
            match quote {
                Ok(quote) => lines.push(format_quote(&quote)),
                // Holdings must name a real symbol
                Err(AssistantError::NotFound(_))
                    if params.holdings.iter().any(|h| h.symbol == symbol) =>
                {
                    return Err(AssistantError::Validation(format!(
                        "Unknown stock symbol: {}",
                        symbol
                    )));
                }
                Err(AssistantError::NotFound(_)) if !named.is_empty() => {
                    lines.push(format!("{}: no quote found", symbol));
                }
                Err(_) => {}
            }
        }

        let body = if lines.is_empty() {
            MARKET_UNAVAILABLE.to_string()
        } else {
            lines.join("\n")
        };
        Ok(vec![StructuredData::new("Market quotes", body)])
    }

    async fn handle(
        &self,
        request: &HandlerRequest<'_>,
        context: &ContextBlock,
    ) -> Result<HandlerOutcome> {
        let text = generate_answer(&self.generator, GUIDANCE, request.query, context).await?;
        Ok(HandlerOutcome::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;
    use crate::memory::Session;
    use crate::retry::RetryPolicy;
    use crate::testing::{ScriptedModel, StaticMarket};
    use std::time::Duration;

    fn handler(market: Option<Arc<MarketData>>) -> MarketHandler {
        MarketHandler::new(
            TextGenerator::new(Arc::new(ScriptedModel::always("ok")), RetryPolicy::default()),
            market,
            vec!["SPY".to_string()],
        )
    }

    fn market(quotes: &[(&str, f64)]) -> Arc<MarketData> {
        Arc::new(MarketData::new(
            Arc::new(StaticMarket::new(quotes)),
            Duration::from_secs(60),
            RetryPolicy::no_retry(Duration::from_secs(1)),
        ))
    }

    async fn gather(handler: &MarketHandler, query: &str) -> Result<Vec<StructuredData>> {
        let intent = IntentClassifier::new().classify(query);
        let session = Session::new("m");
        let request = HandlerRequest {
            query,
            intent: &intent,
            session: &session,
        };
        handler.gather(&request).await
    }

    #[tokio::test]
    async fn test_named_symbols_are_quoted() {
        let handler = handler(Some(market(&[("NVDA", 120.0), ("SPY", 500.0)])));
        let data = gather(&handler, "What is the stock price of NVDA?").await.unwrap();

        assert!(data[0].body.starts_with("NVDA: $120.00"));
        assert!(!data[0].body.contains("SPY"));
    }

    #[tokio::test]
    async fn test_watchlist_used_without_symbols() {
        let handler = handler(Some(market(&[("SPY", 500.0)])));
        let data = gather(&handler, "How is the market doing?").await.unwrap();
        assert!(data[0].body.starts_with("SPY: $500.00"));
    }

    #[tokio::test]
    async fn test_missing_provider_degrades() {
        let handler = handler(None);
        let data = gather(&handler, "How is the market doing?").await.unwrap();
        assert_eq!(data[0].body, MARKET_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_bare_symbol_is_noted() {
        let handler = handler(Some(market(&[("NVDA", 120.0)])));
        let data = gather(&handler, "quote for QWXYZ and NVDA").await.unwrap();
        assert!(data[0].body.starts_with("QWXYZ: no quote found\nNVDA: $120.00"));
    }

    #[tokio::test]
    async fn test_unknown_held_symbol_rejected() {
        let handler = handler(Some(market(&[("SPY", 500.0)])));
        let result = gather(&handler, "What is my QWXYZ 5 worth at today's price?").await;
        assert!(matches!(result, Err(AssistantError::Validation(msg)) if msg.contains("QWXYZ")));
    }

    #[tokio::test]
    async fn test_exchange_and_fund_jargon_use_watchlist() {
        let handler = handler(Some(market(&[("SPY", 500.0)])));
        for query in [
            "How is the NYSE doing today?",
            "Are ESG funds beating the market this year?",
        ] {
            let data = gather(&handler, query).await.unwrap();
            assert!(data[0].body.starts_with("SPY: $500.00"), "{}", query);
        }
    }
}
