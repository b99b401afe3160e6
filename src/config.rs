//! Runtime configuration
//!
//! Every knob comes from the environment (the binaries load `.env` first)
//! and falls back to the defaults below.

use crate::error::AssistantError;
use crate::retry::RetryPolicy;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which embedding capability backs the retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Hashing,
    Gemini,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_embedding_model: String,
    pub embedding_backend: EmbeddingBackend,
    pub knowledge_base_dir: Option<PathBuf>,

    pub retrieval_top_k: usize,
    pub retrieval_min_score: f32,
    pub context_max_tokens: usize,
    pub history_messages: usize,

    pub session_idle_timeout: Duration,
    pub session_sweep_interval: Duration,

    pub provider_max_attempts: u32,
    pub provider_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,

    pub market_data_base_url: Option<String>,
    pub market_cache_ttl: Duration,
    pub market_watchlist: Vec<String>,

    pub database_url: Option<String>,
    pub port: u16,
    /// Enables the admin routes when set.
    pub admin_token: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_embedding_model: "text-embedding-004".to_string(),
            embedding_backend: EmbeddingBackend::Hashing,
            knowledge_base_dir: None,
            retrieval_top_k: 5,
            retrieval_min_score: 0.1,
            context_max_tokens: 1500,
            history_messages: 10,
            session_idle_timeout: Duration::from_secs(30 * 60),
            session_sweep_interval: Duration::from_secs(60),
            provider_max_attempts: 3,
            provider_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            market_data_base_url: None,
            market_cache_ttl: Duration::from_secs(3600),
            market_watchlist: vec!["SPY".to_string(), "QQQ".to_string(), "DIA".to_string()],
            database_url: None,
            port: 8080,
            admin_token: None,
        }
    }
}

impl AssistantConfig {
    /// Read configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let embedding_backend = match non_empty("EMBEDDING_BACKEND").as_deref() {
            None | Some("hashing") => EmbeddingBackend::Hashing,
            Some("gemini") => EmbeddingBackend::Gemini,
            Some(other) => {
                return Err(AssistantError::Config(format!(
                    "EMBEDDING_BACKEND must be 'hashing' or 'gemini', got '{}'",
                    other
                )))
            }
        };

        let market_watchlist = non_empty("MARKET_WATCHLIST")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.market_watchlist);

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_embedding_model: non_empty("GEMINI_EMBEDDING_MODEL")
                .unwrap_or(defaults.gemini_embedding_model),
            embedding_backend,
            knowledge_base_dir: non_empty("KNOWLEDGE_BASE_DIR").map(PathBuf::from),
            retrieval_top_k: parse_or("RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            retrieval_min_score: parse_or("RETRIEVAL_MIN_SCORE", defaults.retrieval_min_score)?,
            context_max_tokens: parse_or("CONTEXT_MAX_TOKENS", defaults.context_max_tokens)?,
            history_messages: parse_or("HISTORY_MESSAGES", defaults.history_messages)?,
            session_idle_timeout: secs_or("SESSION_IDLE_TIMEOUT_SECS", defaults.session_idle_timeout)?,
            session_sweep_interval: secs_or(
                "SESSION_SWEEP_INTERVAL_SECS",
                defaults.session_sweep_interval,
            )?,
            provider_max_attempts: parse_or("PROVIDER_MAX_ATTEMPTS", defaults.provider_max_attempts)?,
            provider_timeout: secs_or("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout)?,
            retry_base_delay: millis_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay)?,
            retry_max_delay: millis_or("RETRY_MAX_DELAY_MS", defaults.retry_max_delay)?,
            market_data_base_url: non_empty("MARKET_DATA_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            market_cache_ttl: secs_or("MARKET_CACHE_TTL_SECS", defaults.market_cache_ttl)?,
            market_watchlist,
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            port: match non_empty("PORT") {
                Some(_) => parse_or("PORT", defaults.port)?,
                None => parse_or("API_PORT", defaults.port)?,
            },
            admin_token: non_empty("ADMIN_TOKEN"),
        })
    }

    /// Retry policy applied to every external capability call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.provider_max_attempts.max(1),
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            timeout: self.provider_timeout,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AssistantError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    parse_or(key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or(key: &str, default: Duration) -> Result<Duration> {
    parse_or(key, default.as_millis() as u64).map(Duration::from_millis)
}
