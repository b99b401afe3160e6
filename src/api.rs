//! REST API Server for the Finance Assistant
//!
//! Exposes the assistant via HTTP endpoints for web front ends.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::agent::Assistant;
use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::rag::{KnowledgeArticle, KnowledgeBase};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    /// Omit to start a new session.
    pub session_id: Option<String>,
    pub message: String,
}

/// Articles inline, or a directory of article JSON files under the
/// configured knowledge base directory. The bundled corpus is used when
/// neither is given.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct RebuildRequest {
    #[serde(default)]
    pub articles: Option<Vec<KnowledgeArticle>>,
    #[serde(default)]
    pub directory: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn failure(e: AssistantError) -> ApiResult {
    let status = match e {
        AssistantError::Validation(_) | AssistantError::EmptyCorpus => StatusCode::BAD_REQUEST,
        AssistantError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (status, Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
    pub admin: Option<Arc<AdminSettings>>,
}

/// Admin routes are mounted only when a token is configured.
#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub token: String,
    /// Directory rebuilds must resolve inside this root.
    pub knowledge_root: Option<PathBuf>,
}

impl AdminSettings {
    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        config.admin_token.as_ref().map(|token| Self {
            token: token.clone(),
            knowledge_root: config.knowledge_base_dir.clone(),
        })
    }

    /// Accepts `x-admin-token: <token>` or `Authorization: Bearer <token>`.
    fn authorizes(&self, headers: &HeaderMap) -> bool {
        let presented = header_value(headers, "x-admin-token").or_else(|| {
            header_value(headers, "authorization").and_then(|v| v.strip_prefix("Bearer "))
        });

        presented.is_some_and(|given| {
            Sha256::digest(given.trim().as_bytes()) == Sha256::digest(self.token.as_bytes())
        })
    }

    /// Resolves a requested directory, relative paths against the root, and
    /// rejects anything that lands outside it.
    fn confine(&self, requested: &str) -> Result<PathBuf, AssistantError> {
        let root = self.knowledge_root.as_deref().ok_or_else(|| {
            AssistantError::Validation(
                "directory rebuilds require KNOWLEDGE_BASE_DIR to be configured".to_string(),
            )
        })?;
        let root = std::fs::canonicalize(root).map_err(|e| {
            AssistantError::Config(format!(
                "KNOWLEDGE_BASE_DIR {} is unreadable: {}",
                root.display(),
                e
            ))
        })?;

        let requested_path = FsPath::new(requested);
        let candidate = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            root.join(requested_path)
        };
        let resolved = std::fs::canonicalize(&candidate).map_err(|_| {
            AssistantError::Validation(format!("directory not found: {}", requested))
        })?;

        if !resolved.starts_with(&root) {
            return Err(AssistantError::Validation(format!(
                "directory {} is outside the knowledge base directory",
                requested
            )));
        }
        Ok(resolved)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiResult {
    let session_id = match req.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    };
    info!(session_id = %session_id, chars = req.message.len(), "chat request");

    match state.assistant.handle_message(&session_id, &req.message).await {
        Ok(turn) => {
            let mut data = match serde_json::to_value(&turn) {
                Ok(data) => data,
                Err(e) => return failure(e.into()),
            };
            data["session_id"] = serde_json::json!(session_id);
            (StatusCode::OK, Json(ApiResponse::success(data)))
        }
        Err(e) => failure(e),
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_handler(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult {
    match state.assistant.session_summary(&id).await {
        Some(summary) => (StatusCode::OK, Json(ApiResponse::success(summary))),
        None => failure(AssistantError::NotFound(format!("session {}", id))),
    }
}

async fn remove_goal_handler(
    State(state): State<ApiState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult {
    if state.assistant.session_summary(&id).await.is_none() {
        return failure(AssistantError::NotFound(format!("session {}", id)));
    }
    match state.assistant.remove_goal(&id, index).await {
        Ok(goals) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "goals": goals }))),
        ),
        Err(e) => failure(e),
    }
}

/// =============================
/// Admin Endpoints
/// =============================

async fn rebuild_index_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Option<Json<RebuildRequest>>,
) -> ApiResult {
    let Some(admin) = state.admin.as_deref() else {
        return failure(AssistantError::NotFound("admin routes are disabled".to_string()));
    };
    if !admin.authorizes(&headers) {
        warn!("Rejected admin request with a missing or invalid token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Missing or invalid admin token".to_string())),
        );
    }

    let req = body.map(|Json(req)| req).unwrap_or_default();
    let corpus = match (req.articles, req.directory.as_deref()) {
        (Some(articles), _) => KnowledgeBase::new(articles),
        (None, Some(dir)) => admin.confine(dir).and_then(|dir| KnowledgeBase::load_dir(&dir)),
        (None, None) => KnowledgeBase::builtin(),
    };

    let result = match corpus {
        Ok(corpus) => state.assistant.rebuild_index(corpus.into_articles()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(count) => {
            info!(articles = count, "Index rebuilt via admin endpoint");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({ "articles": count }))),
            )
        }
        Err(e) => failure(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>, admin: Option<AdminSettings>) -> Router {
    let admin = admin.map(Arc::new);
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:id", get(session_handler))
        .route("/api/sessions/:id/goals/:index", delete(remove_goal_handler));

    if admin.is_some() {
        router = router.route("/api/admin/rebuild-index", post(rebuild_index_handler));
    } else {
        info!("ADMIN_TOKEN not set; admin routes disabled");
    }

    router
        .with_state(ApiState { assistant, admin })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<Assistant>,
    port: u16,
    admin: Option<AdminSettings>,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant, admin);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
