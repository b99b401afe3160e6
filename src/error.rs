//! Error types for the finance assistant core

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Retrieval
    // =============================

    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("Embedding error: {0}")]
    Embedding(String),

    // =============================
    // External Capabilities
    // =============================

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    // =============================
    // Routing / Input
    // =============================

    #[error("No handler configured for intent: {0}")]
    UnroutableIntent(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    // =============================
    // Infrastructure
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Transient failures that are worth another attempt after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::RateLimited(_) | AssistantError::Timeout(_) | AssistantError::Network(_)
        )
    }

    /// Failures of the hosted language model (after retries), which surface
    /// to the user as an apology rather than an error.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            AssistantError::RateLimited(_)
                | AssistantError::Provider(_)
                | AssistantError::Timeout(_)
                | AssistantError::Network(_)
                | AssistantError::Http(_)
        )
    }
}
