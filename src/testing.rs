//! Test doubles shared by unit tests

use crate::error::AssistantError;
use crate::llm::{GenerateOptions, LanguageModelProvider};
use crate::market::{MarketDataProvider, Quote};
use crate::rag::{EmbeddingProvider, KnowledgeArticle};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Language model that throttles a fixed number of times, then answers.
pub struct ScriptedModel {
    reply: String,
    throttle_first: usize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn always(reply: &str) -> Self {
        Self::rate_limited_then(reply, 0)
    }

    pub fn rate_limited_then(reply: &str, failures: usize) -> Self {
        Self {
            reply: reply.to_string(),
            throttle_first: failures,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModelProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if call < self.throttle_first {
            return Err(AssistantError::RateLimited("429 from scripted model".into()));
        }
        Ok(self.reply.clone())
    }
}

/// Fixed price table; anything else is `NotFound`.
pub struct StaticMarket {
    prices: HashMap<String, f64>,
    calls: AtomicUsize,
}

impl StaticMarket {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarket {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| AssistantError::NotFound(symbol.to_string()))?;
        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            change: 1.25,
            change_percent: 0.5,
            as_of: Utc::now(),
        })
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AssistantError::Embedding("embedding service down".into()))
    }
}

fn article(id: &str, title: &str, category: &str, content: &str, tags: &[&str]) -> KnowledgeArticle {
    KnowledgeArticle {
        id: id.to_string(),
        title: title.to_string(),
        category: category.to_string(),
        content: content.to_string(),
        source: "Investor Basics Guide".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

/// Small corpus. `stocks_101` comes first.
pub fn sample_articles() -> Vec<KnowledgeArticle> {
    vec![
        article(
            "stocks_101",
            "What Is a Stock?",
            "fundamentals",
            "A stock is a share of ownership in a company. Stock owners share in profits \
             through dividends and price gains. Common stock carries voting rights while \
             preferred stock pays fixed dividends first.",
            &["stocks", "equity"],
        ),
        article(
            "bonds_101",
            "How Bonds Work",
            "fundamentals",
            "A bond is a loan to a government or corporation. The issuer pays interest \
             on a schedule and returns the principal at maturity. Bond prices fall when \
             interest rates rise.",
            &["bonds", "fixed income"],
        ),
        article(
            "diversification",
            "Diversification Basics",
            "portfolio",
            "Diversification spreads money across asset classes, sectors and regions so \
             that one loss does not sink the whole portfolio. Rebalance once a year to \
             restore the target allocation.",
            &["portfolio", "risk"],
        ),
        article(
            "retirement_accounts",
            "Tax-Advantaged Retirement Accounts",
            "tax",
            "Retirement accounts such as a 401k or traditional IRA defer taxes until \
             withdrawal. A Roth IRA is funded with after-tax money and qualified \
             withdrawals owe no taxes.",
            &["tax", "retirement", "ira"],
        ),
        article(
            "capital_gains",
            "Capital Gains Tax",
            "tax",
            "Selling an investment for more than you paid creates a capital gain. Gains \
             held over one year get the lower long-term tax rate.",
            &["tax", "capital gains"],
        ),
        article(
            "emergency_fund",
            "Building an Emergency Fund",
            "planning",
            "Keep three to six months of expenses in a savings account before investing. \
             The fund covers job loss or medical bills without forcing a sale.",
            &["goals", "savings"],
        ),
    ]
}
