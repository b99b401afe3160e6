//! Transcript journal
//!
//! Committed turns are written here so a session evicted for idleness (or
//! lost to a restart) comes back with its history. The journal is
//! best-effort: callers log failures and carry on.

use crate::error::AssistantError;
use crate::memory::{Message, MessageMetadata, Role};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trait for transcript persistence
#[async_trait::async_trait]
pub trait TranscriptStore: Send + Sync {
    fn name(&self) -> &str;

    /// Append messages of one committed turn, in order.
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()>;

    /// The most recent `limit` messages for a session, oldest first.
    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;
}

/// Sessions the in-memory journal keeps before dropping the least recently
/// written one.
pub const DEFAULT_JOURNAL_SESSIONS: usize = 10_000;

/// Messages kept per session by default.
pub const DEFAULT_JOURNAL_MESSAGES: usize = 200;

struct Transcript {
    messages: VecDeque<Message>,
    last_write: u64,
}

#[derive(Default)]
struct Journal {
    transcripts: HashMap<String, Transcript>,
    writes: u64,
}

/// In-memory journal for development and tests. Bounded both per session
/// and in session count.
pub struct InMemoryTranscriptStore {
    max_messages: usize,
    max_sessions: usize,
    journal: Arc<RwLock<Journal>>,
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_JOURNAL_MESSAGES, DEFAULT_JOURNAL_SESSIONS)
    }
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_messages: usize, max_sessions: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            max_sessions: max_sessions.max(1),
            journal: Arc::new(RwLock::new(Journal::default())),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.journal.read().await.transcripts.len()
    }
}

#[async_trait::async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let mut journal = self.journal.write().await;
        journal.writes += 1;
        let stamp = journal.writes;

        if !journal.transcripts.contains_key(session_id)
            && journal.transcripts.len() >= self.max_sessions
        {
            let oldest = journal
                .transcripts
                .iter()
                .min_by_key(|(_, transcript)| transcript.last_write)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                journal.transcripts.remove(&oldest);
                debug!(session_id = %oldest, "Dropped oldest journaled session");
            }
        }

        let transcript = journal
            .transcripts
            .entry(session_id.to_string())
            .or_insert_with(|| Transcript {
                messages: VecDeque::new(),
                last_write: stamp,
            });
        transcript.messages.extend(messages.iter().cloned());
        while transcript.messages.len() > self.max_messages {
            transcript.messages.pop_front();
        }
        transcript.last_write = stamp;
        Ok(())
    }

    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let journal = self.journal.read().await;
        Ok(journal
            .transcripts
            .get(session_id)
            .map(|transcript| {
                let start = transcript.messages.len().saturating_sub(limit);
                transcript.messages.iter().skip(start).cloned().collect()
            })
            .unwrap_or_default())
    }
}

// =============================
// Postgres
// =============================

pub struct PostgresTranscriptStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresTranscriptStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                AssistantError::Database(format!("Failed to connect to Postgres: {}", e))
            })?;

        info!("Transcript journal backed by Postgres");
        Ok(Self {
            pool,
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_transcripts (
                      seq BIGSERIAL PRIMARY KEY,
                      message_id UUID NOT NULL UNIQUE,
                      session_id TEXT NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      intent TEXT,
                      citations TEXT NOT NULL DEFAULT '[]',
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_session_transcripts_session_seq
                    ON session_transcripts (session_id, seq);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::Database(format!(
                    "Failed to initialize transcript schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TranscriptStore for PostgresTranscriptStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AssistantError::Database(format!("Failed to begin transcript transaction: {}", e))
        })?;

        for message in messages {
            let intent = message.metadata.intent.map(|i| i.as_str().to_string());
            let citations = serde_json::to_string(&message.metadata.citations)?;

            sqlx::query(
                r#"
                INSERT INTO session_transcripts
                  (message_id, session_id, role, content, intent, citations, created_at)
                VALUES
                  ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (message_id) DO NOTHING
                "#,
            )
            .bind(message.id)
            .bind(session_id)
            .bind(message.role.as_str())
            .bind(&message.text)
            .bind(intent)
            .bind(citations)
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AssistantError::Database(format!("Failed to journal message: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AssistantError::Database(format!("Failed to commit transcript: {}", e))
        })?;

        Ok(())
    }

    async fn load(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT message_id, role, content, intent, citations, created_at
            FROM (
              SELECT * FROM session_transcripts
              WHERE session_id = $1
              ORDER BY seq DESC
              LIMIT $2
            ) recent
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssistantError::Database(format!("Failed to load transcript: {}", e)))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role").unwrap_or_else(|_| "user".to_string());
            let Some(role) = Role::parse(&role) else {
                warn!(session_id, role = %role, "Skipping journaled message with unknown role");
                continue;
            };
            let intent: Option<String> = row.try_get("intent").unwrap_or(None);
            let citations: String = row.try_get("citations").unwrap_or_else(|_| "[]".to_string());
            let timestamp: DateTime<Utc> = row.try_get("created_at").unwrap_or_else(|_| Utc::now());

            messages.push(Message {
                id: row.try_get("message_id").unwrap_or_else(|_| Uuid::new_v4()),
                role,
                text: row.try_get("content").unwrap_or_default(),
                timestamp,
                metadata: MessageMetadata {
                    intent: intent.and_then(|raw| serde_json::from_value(raw.into()).ok()),
                    citations: serde_json::from_str(&citations).unwrap_or_default(),
                },
            });
        }

        Ok(messages)
    }
}

/// Postgres when a database URL is configured and reachable, in-memory
/// otherwise. The in-memory journal keeps `max_messages` per session.
pub async fn transcript_store_from_url(
    database_url: Option<&str>,
    max_messages: usize,
) -> Arc<dyn TranscriptStore> {
    if let Some(url) = database_url {
        match PostgresTranscriptStore::connect(url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!("Falling back to in-memory transcript journal: {}", e),
        }
    }
    Arc::new(InMemoryTranscriptStore::with_limits(
        max_messages,
        DEFAULT_JOURNAL_SESSIONS,
    ))
}
