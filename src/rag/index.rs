//! Embedding index
//!
//! An `EmbeddingIndex` is immutable once built. `SharedIndex` holds the
//! current snapshot behind an `Arc`; a rebuild embeds the new corpus off to
//! the side and then swaps the pointer, so readers always see either the old
//! index or the new one in full.

use crate::error::AssistantError;
use crate::rag::embedder::EmbeddingProvider;
use crate::rag::knowledge::{KnowledgeArticle, KnowledgeBase};
use crate::retry::RetryPolicy;
use crate::Result;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredArticle {
    pub article_id: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    article_id: String,
    vector: Vec<f32>,
    norm: f32,
}

/// One vector per article id, queried by cosine similarity.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Build from `(article_id, vector)` pairs. All vectors must share a
    /// dimension and ids must be unique.
    pub fn build(vectors: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dimension = match vectors.first() {
            Some((_, v)) => v.len(),
            None => return Err(AssistantError::EmptyCorpus),
        };

        let mut entries = Vec::with_capacity(vectors.len());
        let mut seen = HashSet::with_capacity(vectors.len());
        for (article_id, vector) in vectors {
            if vector.len() != dimension {
                return Err(AssistantError::Embedding(format!(
                    "Vector for {} has dimension {}, expected {}",
                    article_id,
                    vector.len(),
                    dimension
                )));
            }
            if !seen.insert(article_id.clone()) {
                return Err(AssistantError::Validation(format!(
                    "Duplicate article id in index: {}",
                    article_id
                )));
            }
            let norm = l2_norm(&vector);
            entries.push(IndexEntry {
                article_id,
                vector,
                norm,
            });
        }

        Ok(Self { entries, dimension })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Top `k` articles by descending cosine similarity, ties broken by
    /// ascending article id.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredArticle>> {
        if vector.len() != self.dimension {
            return Err(AssistantError::Embedding(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        let query_norm = l2_norm(vector);
        let mut scored: Vec<ScoredArticle> = self
            .entries
            .iter()
            .map(|entry| ScoredArticle {
                article_id: entry.article_id.clone(),
                score: cosine(vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        scored.sort_by(compare_scored);
        scored.truncate(k);
        Ok(scored)
    }
}

fn compare_scored(a: &ScoredArticle, b: &ScoredArticle) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.article_id.cmp(&b.article_id))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm <= f32::EPSILON || b_norm <= f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

//
// ================= Shared snapshot =================
//

/// An index plus the articles it was built from.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub index: EmbeddingIndex,
    articles: HashMap<String, Arc<KnowledgeArticle>>,
    pub built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn article(&self, id: &str) -> Option<&Arc<KnowledgeArticle>> {
        self.articles.get(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Read-mostly handle to the current index snapshot.
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot a reader should use for the whole of one query.
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.read().await.clone()
    }

    /// Embed `articles` and atomically replace the current index.
    ///
    /// On any failure the previous snapshot stays in place.
    pub async fn rebuild(
        &self,
        articles: Vec<KnowledgeArticle>,
        embedder: &dyn EmbeddingProvider,
        policy: &RetryPolicy,
    ) -> Result<usize> {
        if articles.is_empty() {
            warn!("Refusing to rebuild index from an empty corpus");
            return Err(AssistantError::EmptyCorpus);
        }
        let corpus = KnowledgeBase::new(articles)?;

        let mut vectors = Vec::with_capacity(corpus.len());
        for article in corpus.articles() {
            let text = article.embedding_text();
            let vector = policy
                .run("embedding.embed", || embedder.embed(&text))
                .await
                .map_err(|e| {
                    AssistantError::Embedding(format!("Failed to embed {}: {}", article.id, e))
                })?;
            vectors.push((article.id.clone(), vector));
        }

        let index = EmbeddingIndex::build(vectors)?;
        let articles = corpus
            .into_articles()
            .into_iter()
            .map(|a| (a.id.clone(), Arc::new(a)))
            .collect();
        let snapshot = Arc::new(IndexSnapshot {
            index,
            articles,
            built_at: Utc::now(),
        });
        let count = snapshot.len();

        *self.current.write().await = Some(snapshot);

        info!(
            articles = count,
            embedder = embedder.name(),
            "Embedding index rebuilt"
        );
        Ok(count)
    }
}
