//! Retriever: query text in, ranked knowledge passages out.

use crate::error::AssistantError;
use crate::rag::embedder::EmbeddingProvider;
use crate::rag::index::{IndexSnapshot, ScoredArticle, SharedIndex};
use crate::rag::knowledge::KnowledgeArticle;
use crate::retry::RetryPolicy;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// A ranked passage. `rank` starts at 1 and scores never increase with rank.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub article_id: String,
    pub score: f32,
    pub rank: usize,
    pub article: Arc<KnowledgeArticle>,
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<SharedIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl Retriever {
    pub fn new(
        index: Arc<SharedIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            index,
            embedder,
            policy,
        }
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Up to `top_k` passages scoring at least `min_score`.
    ///
    /// An empty result is a normal outcome. Only an unavailable embedding
    /// capability is an error.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(snapshot) = self.index.snapshot().await else {
            debug!("Retrieval skipped: no index built");
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        let candidates = snapshot.index.query(&vector, top_k)?;

        Ok(resolve(&snapshot, candidates, min_score, |_| true))
    }

    /// Like `retrieve`, restricted to one article category.
    pub async fn retrieve_in_category(
        &self,
        query: &str,
        category: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(snapshot) = self.index.snapshot().await else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        let candidates = snapshot.index.query(&vector, snapshot.len())?;

        let mut results = resolve(&snapshot, candidates, min_score, |article| {
            article.category.eq_ignore_ascii_case(category)
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = &self.embedder;
        self.policy
            .run("embedding.embed", || embedder.embed(query))
            .await
            .map_err(|e| match e {
                AssistantError::Embedding(_) => e,
                other => AssistantError::Embedding(other.to_string()),
            })
    }
}

/// Attach articles from the same snapshot, apply the threshold and the
/// filter, and number what remains from 1.
fn resolve<F>(
    snapshot: &IndexSnapshot,
    candidates: Vec<ScoredArticle>,
    min_score: f32,
    keep: F,
) -> Vec<RetrievalResult>
where
    F: Fn(&KnowledgeArticle) -> bool,
{
    candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .filter_map(|c| {
            let article = snapshot.article(&c.article_id)?.clone();
            keep(&article).then_some((c, article))
        })
        .enumerate()
        .map(|(i, (c, article))| RetrievalResult {
            article_id: c.article_id,
            score: c.score,
            rank: i + 1,
            article,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedder::HashingEmbedder;
    use crate::testing::{sample_articles, FailingEmbedder};
    use std::time::Duration;

    async fn retriever_with(embedder: Arc<dyn EmbeddingProvider>) -> Retriever {
        let index = Arc::new(SharedIndex::new());
        let policy = RetryPolicy::no_retry(Duration::from_secs(1));
        index
            .rebuild(sample_articles(), &HashingEmbedder::default(), &policy)
            .await
            .unwrap();
        Retriever::new(index, embedder, policy)
    }

    #[tokio::test]
    async fn test_stock_question_finds_fundamentals() {
        let retriever = retriever_with(Arc::new(HashingEmbedder::default())).await;

        let results = retriever.retrieve("What is a stock?", 3, 0.1).await.unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].article_id, "stocks_101");
        assert_eq!(results[0].article.category, "fundamentals");
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_results_are_sorted_and_above_threshold() {
        let retriever = retriever_with(Arc::new(HashingEmbedder::default())).await;

        let queries = [
            "how do bonds and stocks differ",
            "tax advantaged retirement accounts",
            "diversify my portfolio across sectors",
            "zzz qqq unrelated gibberish",
        ];
        for query in queries {
            let results = retriever.retrieve(query, 5, 0.05).await.unwrap();
            assert!(results.len() <= 5);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(results.iter().all(|r| r.score >= 0.05));
            for (i, r) in results.iter().enumerate() {
                assert_eq!(r.rank, i + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let retriever = retriever_with(Arc::new(HashingEmbedder::default())).await;
        let results = retriever.retrieve("what is the", 5, 0.1).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_renumbers_ranks() {
        let retriever = retriever_with(Arc::new(HashingEmbedder::default())).await;

        let results = retriever
            .retrieve_in_category("retirement accounts and taxes", "tax", 5, 0.0)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.article.category == "tax"));
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_embedding_error() {
        let retriever = retriever_with(Arc::new(FailingEmbedder)).await;
        let result = retriever.retrieve("What is a stock?", 3, 0.1).await;
        assert!(matches!(result, Err(AssistantError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_without_index_returns_empty() {
        let retriever = Retriever::new(
            Arc::new(SharedIndex::new()),
            Arc::new(HashingEmbedder::default()),
            RetryPolicy::default(),
        );
        assert!(retriever.retrieve("stocks", 3, 0.0).await.unwrap().is_empty());
    }
}
