//! Financial education Q&A

use crate::handlers::{generate_answer, Handler, HandlerOutcome, HandlerRequest};
use crate::llm::TextGenerator;
use crate::models::IntentKind;
use crate::rag::ContextBlock;
use crate::Result;
use async_trait::async_trait;

const GUIDANCE: &str = "Role: financial educator.
- Explain concepts in plain language for a beginner
- Use a short example where it helps
- If the context does not cover the question, say so rather than guessing";

pub struct EducationHandler {
    generator: TextGenerator,
}

impl EducationHandler {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for EducationHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::Education
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
