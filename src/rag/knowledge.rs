//! Knowledge base corpus
//!
//! Articles are JSON records `{id, title, category, content, source, tags}`.
//! A file may hold one record or an array of records.

use crate::error::AssistantError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const BUILTIN_CORPUS: &str = include_str!("../../data/knowledge_base.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeArticle {
    pub id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeArticle {
    /// Text handed to the embedding capability.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.content, self.tags.join(" "))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArticleFile {
    Many(Vec<KnowledgeArticle>),
    One(KnowledgeArticle),
}

/// Immutable, id-unique article corpus.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    articles: Vec<KnowledgeArticle>,
}

impl KnowledgeBase {
    /// Build a corpus, rejecting blank or duplicate ids.
    pub fn new(articles: Vec<KnowledgeArticle>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(articles.len());
        for article in &articles {
            if article.id.trim().is_empty() {
                return Err(AssistantError::Validation(format!(
                    "Article '{}' has an empty id",
                    article.title
                )));
            }
            if !seen.insert(article.id.as_str()) {
                return Err(AssistantError::Validation(format!(
                    "Duplicate article id: {}",
                    article.id
                )));
            }
        }
        Ok(Self { articles })
    }

    /// The bundled financial-education corpus.
    pub fn builtin() -> Result<Self> {
        let articles: Vec<KnowledgeArticle> = serde_json::from_str(BUILTIN_CORPUS)?;
        Self::new(articles)
    }

    /// Load every `*.json` file under `dir`. Unreadable files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        entries.sort();

        let mut articles = Vec::new();
        for path in entries {
            let parsed = fs::read_to_string(&path)
                .map_err(AssistantError::from)
                .and_then(|raw| serde_json::from_str::<ArticleFile>(&raw).map_err(AssistantError::from));

            match parsed {
                Ok(ArticleFile::Many(mut batch)) => articles.append(&mut batch),
                Ok(ArticleFile::One(article)) => articles.push(article),
                Err(e) => warn!(path = %path.display(), "Failed to load knowledge file: {}", e),
            }
        }

        info!(dir = %dir.display(), count = articles.len(), "Loaded knowledge base");
        Self::new(articles)
    }

    pub fn articles(&self) -> &[KnowledgeArticle] {
        &self.articles
    }

    pub fn into_articles(self) -> Vec<KnowledgeArticle> {
        self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn by_category(&self, category: &str) -> Vec<&KnowledgeArticle> {
        self.articles
            .iter()
            .filter(|a| a.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&KnowledgeArticle> {
        self.articles.iter().filter(|a| a.has_tag(tag)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn article(id: &str, category: &str) -> KnowledgeArticle {
        KnowledgeArticle {
            id: id.to_string(),
            title: format!("Title {}", id),
            category: category.to_string(),
            content: "content".to_string(),
            source: "Guide".to_string(),
            tags: vec!["Investing".to_string()],
        }
    }

    #[test]
    fn test_builtin_corpus_loads() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert!(kb.len() >= 10);
        assert!(!kb.by_category("fundamentals").is_empty());
        assert!(!kb.by_category("tax").is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = KnowledgeBase::new(vec![article("a", "x"), article("a", "y")]);
        assert!(matches!(result, Err(AssistantError::Validation(_))));
    }

    #[test]
    fn test_category_and_tag_lookup_ignore_case() {
        let kb = KnowledgeBase::new(vec![article("a", "Tax"), article("b", "portfolio")]).unwrap();
        assert_eq!(kb.by_category("tax").len(), 1);
        assert_eq!(kb.by_tag("investing").len(), 2);
    }

    #[test]
    fn test_load_dir_accepts_single_and_array_files() {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("fa-kb-{}", nanos));
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("one.json"),
            serde_json::to_string(&article("single", "fundamentals")).unwrap(),
        )
        .unwrap();
        fs::write(
            dir.join("many.json"),
            serde_json::to_string(&vec![article("m1", "tax"), article("m2", "tax")]).unwrap(),
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "{ not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let kb = KnowledgeBase::load_dir(&dir).unwrap();
        assert_eq!(kb.len(), 3);

        fs::remove_dir_all(&dir).unwrap();
    }
}
