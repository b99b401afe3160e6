//! Assistant - the per-turn pipeline
//!
//! QUERY → CLASSIFY → ROUTE → GATHER → RETRIEVE → ASSEMBLE → HANDLE → COMMIT
//!
//! The session lock is held for the whole turn, so turns for one session
//! run one at a time in arrival order while other sessions proceed in
//! parallel. A turn commits both messages and any structured update
//! together, or nothing at all.

use crate::classifier::IntentClassifier;
use crate::config::{AssistantConfig, EmbeddingBackend};
use crate::error::AssistantError;
use crate::handlers::{
    EducationHandler, GoalPlanningHandler, HandlerRequest, MarketHandler, NewsHandler,
    PortfolioHandler, TaxHandler,
};
use crate::llm::{GeminiClient, TextGenerator};
use crate::market::{HttpMarketDataProvider, MarketData};
use crate::memory::{Message, MessageMetadata, SessionStore, SessionSummary};
use crate::models::{Citation, Goal, Intent, TurnResponse};
use crate::rag::{
    assemble, EmbeddingProvider, GeminiEmbedder, HashingEmbedder, KnowledgeArticle,
    KnowledgeBase, RetrievalResult, Retriever, SharedIndex, StructuredData,
};
use crate::retry::RetryPolicy;
use crate::router::{HandlerRef, Router};
use crate::state::{transcript_store_from_url, TranscriptStore};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shown to the user when the language model cannot be reached.
pub const PROVIDER_APOLOGY: &str =
    "Sorry, I couldn't put together an answer right now. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub retrieval_top_k: usize,
    pub retrieval_min_score: f32,
    pub context_max_tokens: usize,
    pub history_messages: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&AssistantConfig::default())
    }
}

impl TurnSettings {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            retrieval_top_k: config.retrieval_top_k,
            retrieval_min_score: config.retrieval_min_score,
            context_max_tokens: config.context_max_tokens,
            history_messages: config.history_messages,
        }
    }
}

/// One handler per role, wired to shared capabilities.
pub fn build_handlers(
    generator: TextGenerator,
    market: Option<Arc<MarketData>>,
    watchlist: Vec<String>,
) -> Vec<HandlerRef> {
    vec![
        Arc::new(EducationHandler::new(generator.clone())),
        Arc::new(PortfolioHandler::new(generator.clone(), market.clone())),
        Arc::new(MarketHandler::new(generator.clone(), market, watchlist)),
        Arc::new(GoalPlanningHandler::new(generator.clone())),
        Arc::new(NewsHandler::new(generator.clone())),
        Arc::new(TaxHandler::new(generator)),
    ]
}

pub struct Assistant {
    classifier: IntentClassifier,
    router: Router,
    retriever: Retriever,
    sessions: Arc<SessionStore>,
    journal: Arc<dyn TranscriptStore>,
    rebuild_policy: RetryPolicy,
    settings: TurnSettings,
}

impl Assistant {
    pub fn new(
        router: Router,
        retriever: Retriever,
        sessions: Arc<SessionStore>,
        journal: Arc<dyn TranscriptStore>,
        rebuild_policy: RetryPolicy,
        settings: TurnSettings,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            router,
            retriever,
            sessions,
            journal,
            rebuild_policy,
            settings,
        }
    }

    /// Wire every capability from configuration and build the initial index.
    pub async fn from_config(config: &AssistantConfig) -> Result<Self> {
        let policy = config.retry_policy();

        let model = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
        let generator = TextGenerator::new(Arc::new(model), policy.clone());

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::default()),
            EmbeddingBackend::Gemini => Arc::new(GeminiEmbedder::new(
                config.gemini_api_key.clone(),
                config.gemini_embedding_model.clone(),
            )?),
        };

        let market = match &config.market_data_base_url {
            Some(url) => Some(Arc::new(MarketData::new(
                Arc::new(HttpMarketDataProvider::new(url)?),
                config.market_cache_ttl,
                policy.clone(),
            ))),
            None => {
                info!("MARKET_DATA_BASE_URL not set; market quotes disabled");
                None
            }
        };

        let router = Router::new(build_handlers(
            generator,
            market,
            config.market_watchlist.clone(),
        ))?;
        let retriever = Retriever::new(Arc::new(SharedIndex::new()), embedder, policy.clone());
        let sessions = Arc::new(SessionStore::new(config.session_idle_timeout));
        let journal =
            transcript_store_from_url(config.database_url.as_deref(), config.history_messages)
                .await;

        let assistant = Self::new(
            router,
            retriever,
            sessions,
            journal,
            policy,
            TurnSettings::from_config(config),
        );

        let corpus = match &config.knowledge_base_dir {
            Some(dir) => KnowledgeBase::load_dir(dir)?,
            None => KnowledgeBase::builtin()?,
        };
        assistant.rebuild_index(corpus.into_articles()).await?;

        Ok(assistant)
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Administrative: embed `articles` and swap in a new index. The old
    /// index stays live if this fails.
    pub async fn rebuild_index(&self, articles: Vec<KnowledgeArticle>) -> Result<usize> {
        self.retriever
            .index()
            .rebuild(
                articles,
                self.retriever.embedder().as_ref(),
                &self.rebuild_policy,
            )
            .await
    }

    pub async fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.sessions.summary(session_id).await
    }

    /// Remove a goal by position and return the remaining goals.
    pub async fn remove_goal(&self, session_id: &str, index: usize) -> Result<Vec<Goal>> {
        let lease = self.sessions.lease(session_id).await;
        let mut session = lease.lock().await;
        session.remove_goal(index)?;
        Ok(session.goals().to_vec())
    }

    /// Process one user message end to end.
    pub async fn handle_message(&self, session_id: &str, text: &str) -> Result<TurnResponse> {
        let session_id = session_id.trim();
        let text = text.trim();
        if session_id.is_empty() {
            return Err(AssistantError::Validation("session id is required".to_string()));
        }
        if text.is_empty() {
            return Err(AssistantError::Validation("message is empty".to_string()));
        }

        let start = Instant::now();
        let lease = self.sessions.lease(session_id).await;
        let mut session = lease.lock().await;

        if !session.is_hydrated() {
            let history = match self
                .journal
                .load(session_id, self.settings.history_messages)
                .await
            {
                Ok(history) => history,
                Err(e) => {
                    warn!(session_id, "Could not hydrate session from journal: {}", e);
                    Vec::new()
                }
            };
            session.hydrate(history);
        }

        let intent = self.classifier.classify(text);
        info!(
            session_id,
            intent = %intent.kind,
            confidence = intent.confidence,
            "Classified query"
        );

        let handler = self.router.route(intent.kind)?;

        let outcome = {
            let request = HandlerRequest {
                query: text,
                intent: &intent,
                session: &*session,
            };

            let structured = self.gather(&handler, &request).await?;
            let passages = self.retrieve(&handler, text, session_id).await;
            let context = assemble(
                &passages,
                session.recent_messages(self.settings.history_messages),
                &structured,
                self.settings.context_max_tokens,
            );
            debug!(
                session_id,
                tokens = context.token_estimate,
                citations = context.citations.len(),
                fingerprint = %context.fingerprint,
                "Context assembled"
            );

            match handler.handle(&request, &context).await {
                Ok(outcome) => (outcome, context.citations),
                Err(AssistantError::Validation(msg)) => {
                    return Err(AssistantError::Validation(msg));
                }
                Err(e) => {
                    error!(session_id, intent = %intent.kind, "Handler failed: {}", e);
                    return Ok(apology(&intent));
                }
            }
        };
        let (outcome, citations) = outcome;

        let response_text = with_sources(&outcome.response_text, &citations);
        let portfolio_changed = outcome.update.portfolio.is_some();
        let goal_added = outcome.update.new_goal.is_some();

        let user_message = Message::user(text);
        let assistant_message = Message::assistant(
            response_text.clone(),
            MessageMetadata {
                intent: Some(intent.kind),
                citations: citations.clone(),
            },
        );
        session.commit_turn(
            user_message.clone(),
            assistant_message.clone(),
            outcome.update,
        )?;

        self.journal_turn(session_id, &[user_message, assistant_message])
            .await;

        let response = TurnResponse {
            response_text,
            intent: intent.kind,
            confidence: intent.confidence,
            citations,
            updated_portfolio: portfolio_changed.then(|| session.portfolio().clone()),
            updated_goals: goal_added.then(|| session.goals().to_vec()),
        };

        info!(
            session_id,
            intent = %intent.kind,
            messages = session.messages().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Turn committed"
        );
        Ok(response)
    }

    async fn gather(
        &self,
        handler: &HandlerRef,
        request: &HandlerRequest<'_>,
    ) -> Result<Vec<StructuredData>> {
        match handler.gather(request).await {
            Ok(data) => Ok(data),
            Err(AssistantError::Validation(msg)) => Err(AssistantError::Validation(msg)),
            Err(e) => {
                warn!(intent = %handler.kind(), "Structured data unavailable: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Retrieval failures degrade to an answer without citations.
    async fn retrieve(
        &self,
        handler: &HandlerRef,
        text: &str,
        session_id: &str,
    ) -> Vec<RetrievalResult> {
        let query = match handler.retrieval_focus() {
            Some(focus) => format!("{} {}", text, focus),
            None => text.to_string(),
        };

        match self
            .retriever
            .retrieve(
                &query,
                self.settings.retrieval_top_k,
                self.settings.retrieval_min_score,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(session_id, "Retrieval unavailable, answering without sources: {}", e);
                Vec::new()
            }
        }
    }

    async fn journal_turn(&self, session_id: &str, messages: &[Message]) {
        if let Err(e) = self.journal.append(session_id, messages).await {
            warn!(
                session_id,
                journal = self.journal.name(),
                "Failed to journal turn: {}",
                e
            );
        }
    }
}

fn apology(intent: &Intent) -> TurnResponse {
    TurnResponse {
        response_text: PROVIDER_APOLOGY.to_string(),
        intent: intent.kind,
        confidence: intent.confidence,
        citations: Vec::new(),
        updated_portfolio: None,
        updated_goals: None,
    }
}

/// Append a "Sources:" footer naming each cited article once, in rank order.
fn with_sources(text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }

    let mut ordered: Vec<&Citation> = citations.iter().collect();
    ordered.sort_by_key(|c| c.rank);

    let mut seen: Vec<&str> = Vec::new();
    let mut footer = String::from("Sources:");
    for citation in ordered {
        if seen.contains(&citation.article_id.as_str()) {
            continue;
        }
        seen.push(&citation.article_id);
        footer.push_str(&format!("\n- {} ({})", citation.title, citation.source));
    }

    format!("{}\n\n{}", text.trim_end(), footer)
}
