//! Personal Finance Assistant
//!
//! A conversational assistant that:
//! - Classifies each query into one of six intents with deterministic rules
//! - Routes it to a specialized handler (education, portfolio, market,
//!   goal planning, news, tax)
//! - Grounds answers in a knowledge base through embedding retrieval
//! - Keeps per-session history, portfolio and goals in memory
//! - Serializes turns per session while sessions run concurrently
//!
//! TURN LOOP:
//! QUERY → CLASSIFY → ROUTE → GATHER → RETRIEVE → ASSEMBLE → HANDLE → COMMIT

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod market;
pub mod memory;
pub mod models;
pub mod rag;
pub mod retry;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AssistantError, Result};

// Re-export common types
pub use agent::{build_handlers, Assistant, TurnSettings};
pub use classifier::IntentClassifier;
pub use config::AssistantConfig;
pub use models::*;
