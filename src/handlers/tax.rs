//! Tax education

use crate::handlers::{generate_answer, Handler, HandlerOutcome, HandlerRequest};
use crate::llm::TextGenerator;
use crate::models::IntentKind;
use crate::rag::ContextBlock;
use crate::Result;
use async_trait::async_trait;

const GUIDANCE: &str = "Role: tax educator.
- Explain how account types and tax rules work in general terms
- Mention contribution limits and eligibility only as things to verify
- Never give individualized tax advice";

pub const TAX_DISCLAIMER: &str = "Disclaimer: This is general educational information, not tax advice. \
Tax rules change and depend on your situation; consult a qualified tax professional.";

pub struct TaxHandler {
    generator: TextGenerator,
}

impl TaxHandler {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Handler for TaxHandler {
    fn kind(&self) -> IntentKind {
        IntentKind::Tax
    }

    fn retrieval_focus(&self) -> Option<&str> {
        Some("taxes tax-advantaged accounts 401k IRA Roth traditional HSA")
    }

    async fn handle(
        &self,
        request: &HandlerRequest<'_>,
        context: &ContextBlock,
    ) -> Result<HandlerOutcome> {
        let answer = generate_answer(&self.generator, GUIDANCE, request.query, context).await?;
        Ok(HandlerOutcome::text(format!(
            "{}\n\n{}",
            answer.trim_end(),
            TAX_DISCLAIMER
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;
    use crate::memory::Session;
    use crate::rag::assemble;
    use crate::retry::RetryPolicy;
    use crate::testing::ScriptedModel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_disclaimer_is_appended() {
        let model = Arc::new(ScriptedModel::always("A Roth IRA is funded with after-tax money."));
        let handler = TaxHandler::new(TextGenerator::new(model, RetryPolicy::default()));
        let intent = IntentClassifier::new().classify("How does a Roth IRA work?");
        let session = Session::new("t");
        let request = HandlerRequest {
            query: "How does a Roth IRA work?",
            intent: &intent,
            session: &session,
        };

        let outcome = handler
            .handle(&request, &assemble(&[], &[], &[], 100))
            .await
            .unwrap();

        assert!(outcome.response_text.starts_with("A Roth IRA"));
        assert!(outcome.response_text.ends_with(TAX_DISCLAIMER));
        assert!(outcome.update.is_empty());
    }
}
