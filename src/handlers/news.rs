//! News synthesis

use crate::handlers::{generate_answer, Handler, HandlerOutcome, HandlerRequest};
use crate::llm::TextGenerator;
use crate::models::IntentKind;
use crate::rag::{ContextBlock, StructuredData};
use crate::Result;
use async_trait::async_trait;

const GUIDANCE: &str = "Role: financial news analyst.
- Explain what kinds of news matter for the topics of interest and why
- Place events in broader economic context and note affected asset classes
- Do not predict specific market movements; keep a balanced perspective";

pub struct NewsHandler {
    generator: TextGenerator,
}

impl NewsHandler {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }
}

/// Symbols named in the query first, then the rest of the portfolio.
fn topics(request: &HandlerRequest<'_>) -> Vec<String> {
    let mut topics = request.intent.parameters.symbols.clone();
    for symbol in request.session.portfolio().symbols() {
        if !topics.iter().any(|t| t == symbol) {
            topics.push(symbol.to_string());
        }
    }
    topics
}

#[async_trait]
impl Handler for NewsHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::News
    }

    fn retrieval_focus(&self) -> Option<&str> {
        Some("economic news impact market sentiment financial events")
    }

    async fn gather(&self, request: &HandlerRequest<'_>) -> Result<Vec<StructuredData>> {
        let topics = topics(request);
        let body = if topics.is_empty() {
            "General market news".to_string()
        } else {
            topics.join(", ")
        };
        Ok(vec![StructuredData::new("Topics of interest", body)])
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
