//! Agent roles
//!
//! Every role implements `Handler`. The router picks one per intent; the
//! assistant then runs the same pipeline for all of them:
//! `gather` structured data, retrieve passages (optionally steered by
//! `retrieval_focus`), assemble context, `handle`.

use crate::llm::gemini::DEFAULT_SYSTEM_PROMPT;
use crate::llm::{GenerateOptions, TextGenerator};
use crate::memory::{Session, SessionUpdate};
use crate::models::{Intent, IntentKind, Portfolio};
use crate::rag::{ContextBlock, StructuredData};
use crate::Result;
use async_trait::async_trait;

pub mod education;
pub mod goal;
pub mod market;
pub mod news;
pub mod portfolio;
pub mod tax;

pub use education::EducationHandler;
pub use goal::GoalPlanningHandler;
pub use market::MarketHandler;
pub use news::NewsHandler;
pub use portfolio::PortfolioHandler;
pub use tax::TaxHandler;

/// Everything a handler may look at for one turn.
pub struct HandlerRequest<'a> {
    pub query: &'a str,
    pub intent: &'a Intent,
    pub session: &'a Session,
}

/// Response text plus the structured changes to commit with the turn.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub response_text: String,
    pub update: SessionUpdate,
}

impl HandlerOutcome {
    pub fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            update: SessionUpdate::default(),
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn kind(&self) -> IntentKind;

    /// Topic words appended to the query before embedding it.
    fn retrieval_focus(&self) -> Option<&str> {
        None
    }

    /// Structured facts for the context block. Reject malformed input here
    /// with `AssistantError::Validation`.
    async fn gather(&self, _request: &HandlerRequest<'_>) -> Result<Vec<StructuredData>> {
        Ok(Vec::new())
    }

    async fn handle(
        &self,
        request: &HandlerRequest<'_>,
        context: &ContextBlock,
    ) -> Result<HandlerOutcome>;
}

/// Generate a grounded answer with role-specific guidance.
pub(crate) async fn generate_answer(
    generator: &TextGenerator,
    role_guidance: &str,
    query: &str,
    context: &ContextBlock,
) -> Result<String> {
    let options = GenerateOptions {
        system_instruction: Some(format!("{}\n\n{}", DEFAULT_SYSTEM_PROMPT, role_guidance)),
        ..GenerateOptions::default()
    };
    generator
        .generate_with_context(query, &context.text, &options)
        .await
}

pub(crate) fn describe_holdings(portfolio: &Portfolio) -> String {
    portfolio
        .iter()
        .map(|(symbol, quantity)| format!("- {}: {} shares", symbol, format_quantity(quantity)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{:.0}", quantity)
    } else {
        format!("{}", quantity)
    }
}

/// `1234567.8` -> `1,234,567.80`
pub(crate) fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, cents % 100)
}
