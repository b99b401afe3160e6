//! Language-model capability
//!
//! Handlers never talk to a hosted model directly; they go through a
//! `TextGenerator`, which wraps any `LanguageModelProvider` with the
//! configured timeout + backoff policy.

use crate::retry::RetryPolicy;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub mod gemini;
pub use gemini::GeminiClient;

/// Generation knobs passed through to the provider.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub system_instruction: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 1024,
            system_instruction: None,
        }
    }
}

/// Hosted text generation.
///
/// Implementations report throttling as `AssistantError::RateLimited` so the
/// caller's retry layer can back off.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// A provider plus the retry policy every call goes through.
#[derive(Clone)]
pub struct TextGenerator {
    provider: Arc<dyn LanguageModelProvider>,
    policy: RetryPolicy,
}

impl TextGenerator {
    pub fn new(provider: Arc<dyn LanguageModelProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let provider = self.provider.clone();
        let text = self
            .policy
            .run("language_model.generate", || {
                let provider = provider.clone();
                async move { provider.generate(prompt, options).await }
            })
            .await?;

        info!(provider = self.provider.name(), chars = text.len(), "Generated response");
        Ok(text)
    }

    /// Generate with a context block prepended to the instructions.
    pub async fn generate_with_context(
        &self,
        prompt: &str,
        context: &str,
        options: &GenerateOptions,
    ) -> Result<String> {
        if context.trim().is_empty() {
            return self.generate(prompt, options).await;
        }
        let full_prompt = format!("Context:\n{}\n\nQuestion:\n{}", context, prompt);
        self.generate(&full_prompt, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::testing::ScriptedModel;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_generator_retries_rate_limits() {
        let model = Arc::new(ScriptedModel::rate_limited_then("fine", 3));
        let generator = TextGenerator::new(model.clone(), policy(4));

        let text = generator
            .generate("hello", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "fine");
        assert_eq!(model.calls(), 4);
    }

    #[tokio::test]
    async fn test_generator_surfaces_exhausted_retries() {
        let model = Arc::new(ScriptedModel::rate_limited_then("fine", 3));
        let generator = TextGenerator::new(model.clone(), policy(2));

        let result = generator.generate("hello", &GenerateOptions::default()).await;

        assert!(matches!(result, Err(AssistantError::RateLimited(_))));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_context_is_prepended() {
        let model = Arc::new(ScriptedModel::always("ok"));
        let generator = TextGenerator::new(model.clone(), policy(1));

        generator
            .generate_with_context("What is a bond?", "Bonds are loans.", &GenerateOptions::default())
            .await
            .unwrap();

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.starts_with("Context:\nBonds are loans."));
        assert!(prompt.ends_with("Question:\nWhat is a bond?"));
    }
}
