//! Context assembly
//!
//! Builds the bounded, citation-carrying block handed to a handler. Units are
//! taken in a fixed priority order (structured data, passages by rank, then
//! the most recent turns) and are always included whole. Within a class,
//! inclusion stops at the first unit that does not fit.

use crate::memory::Message;
use crate::models::Citation;
use crate::rag::retriever::RetrievalResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Labelled facts a handler gathered for this turn (holdings, quotes, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    pub label: String,
    pub body: String,
}

impl StructuredData {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Structured,
    Passage,
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub kind: SectionKind,
    pub label: String,
    pub token_estimate: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub text: String,
    pub citations: Vec<Citation>,
    pub token_estimate: usize,
    pub sections: Vec<ContextSection>,
    /// SHA-256 of `text`, hex encoded.
    pub fingerprint: String,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Rough token count used for budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

struct Unit {
    section: ContextSection,
    text: String,
    citation: Option<Citation>,
}

struct Budget {
    max_tokens: usize,
    used: usize,
}

impl Budget {
    fn admit(&mut self, tokens: usize) -> bool {
        match self.used.checked_add(tokens) {
            Some(total) if total <= self.max_tokens => {
                self.used = total;
                true
            }
            _ => false,
        }
    }
}

/// Assemble a context block. Identical inputs give an identical block.
pub fn assemble(
    retrieval: &[RetrievalResult],
    recent_messages: &[Message],
    structured: &[StructuredData],
    max_tokens: usize,
) -> ContextBlock {
    let mut budget = Budget {
        max_tokens,
        used: 0,
    };
    let mut units: Vec<Unit> = Vec::new();

    for data in structured {
        let unit = structured_unit(data);
        if !budget.admit(unit.section.token_estimate) {
            break;
        }
        units.push(unit);
    }

    let mut ranked: Vec<&RetrievalResult> = retrieval.iter().collect();
    ranked.sort_by_key(|r| r.rank);
    for result in ranked {
        let unit = passage_unit(result);
        if !budget.admit(unit.section.token_estimate) {
            break;
        }
        units.push(unit);
    }

    let mut history = Vec::new();
    for message in recent_messages.iter().rev() {
        let unit = history_unit(message);
        if !budget.admit(unit.section.token_estimate) {
            break;
        }
        history.push(unit);
    }
    history.reverse();
    units.extend(history);

    let mut text = String::new();
    let mut citations = Vec::new();
    let mut sections = Vec::with_capacity(units.len());
    for unit in units {
        text.push_str(&unit.text);
        citations.extend(unit.citation);
        sections.push(unit.section);
    }
    let text = text.trim_end().to_string();
    let fingerprint = hex::encode(Sha256::digest(text.as_bytes()));

    ContextBlock {
        text,
        citations,
        token_estimate: budget.used,
        sections,
        fingerprint,
    }
}

fn make_unit(kind: SectionKind, label: String, text: String, citation: Option<Citation>) -> Unit {
    Unit {
        section: ContextSection {
            kind,
            label,
            token_estimate: estimate_tokens(&text),
        },
        text,
        citation,
    }
}

fn structured_unit(data: &StructuredData) -> Unit {
    let text = format!("[{}]\n{}\n\n", data.label, data.body.trim());
    make_unit(SectionKind::Structured, data.label.clone(), text, None)
}

fn passage_unit(result: &RetrievalResult) -> Unit {
    let article = &result.article;
    let text = format!(
        "[Source {}: {} ({})]\n{}\n\n",
        result.rank,
        article.title,
        article.source,
        article.content.trim()
    );
    let citation = Citation {
        article_id: result.article_id.clone(),
        title: article.title.clone(),
        source: article.source.clone(),
        score: result.score,
        rank: result.rank,
    };
    make_unit(SectionKind::Passage, article.id.clone(), text, Some(citation))
}

fn history_unit(message: &Message) -> Unit {
    let text = format!("{}: {}\n\n", message.role.label(), message.text.trim());
    make_unit(
        SectionKind::History,
        message.role.label().to_string(),
        text,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::knowledge::KnowledgeArticle;
    use std::sync::Arc;

    fn result(id: &str, rank: usize, score: f32, content: &str) -> RetrievalResult {
        RetrievalResult {
            article_id: id.to_string(),
            score,
            rank,
            article: Arc::new(KnowledgeArticle {
                id: id.to_string(),
                title: format!("Title {}", id),
                category: "fundamentals".to_string(),
                content: content.to_string(),
                source: "Investor Guide".to_string(),
                tags: Vec::new(),
            }),
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::user("first question"),
            Message::assistant("first answer", Default::default()),
            Message::user("second question"),
            Message::assistant("second answer", Default::default()),
        ]
    }

    #[test]
    fn test_priority_order_and_citations() {
        let structured = vec![StructuredData::new("Portfolio", "AAPL: 10 shares")];
        let passages = vec![result("a", 1, 0.9, "alpha"), result("b", 2, 0.5, "beta")];

        let block = assemble(&passages, &history(), &structured, 10_000);

        let portfolio_at = block.text.find("[Portfolio]").unwrap();
        let passage_at = block.text.find("[Source 1").unwrap();
        let history_at = block.text.find("User: first question").unwrap();
        assert!(portfolio_at < passage_at && passage_at < history_at);
        assert!(block.text.find("first answer").unwrap() < block.text.find("second question").unwrap());

        let ids: Vec<&str> = block.citations.iter().map(|c| c.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(block.sections.len(), 1 + 2 + 4);
    }

    #[test]
    fn test_never_exceeds_budget_and_keeps_units_whole() {
        let long = "word ".repeat(200);
        let passages = vec![
            result("a", 1, 0.9, "short passage"),
            result("b", 2, 0.8, &long),
            result("c", 3, 0.7, "another short one"),
        ];

        for max_tokens in [0, 5, 20, 40, 100, 300, 1000] {
            let block = assemble(&passages, &history(), &[], max_tokens);
            assert!(block.token_estimate <= max_tokens);
            assert!(estimate_tokens(&block.text) <= max_tokens);
            for citation in &block.citations {
                let content = &passages[citation.rank - 1].article.content;
                assert!(block.text.contains(content.trim()));
            }
        }
    }

    #[test]
    fn test_passages_stay_a_rank_prefix() {
        let long = "word ".repeat(200);
        let passages = vec![
            result("a", 1, 0.9, "short passage"),
            result("b", 2, 0.8, &long),
            result("c", 3, 0.7, "another short one"),
        ];

        let block = assemble(&passages, &[], &[], 40);

        let ids: Vec<&str> = block.citations.iter().map(|c| c.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_history_keeps_most_recent_turns() {
        let block = assemble(&[], &history(), &[], 12);

        assert!(block.text.contains("second answer"));
        assert!(!block.text.contains("first question"));
    }

    #[test]
    fn test_deterministic() {
        let passages = vec![result("a", 1, 0.9, "alpha")];
        let messages = history();
        let structured = vec![StructuredData::new("Goal", "Retirement $1,000,000")];

        let first = assemble(&passages, &messages, &structured, 200);
        let second = assemble(&passages, &messages, &structured, 200);

        assert_eq!(first, second);
        assert_eq!(first.fingerprint.len(), 64);
    }

    #[test]
    fn test_empty_inputs() {
        let block = assemble(&[], &[], &[], 100);
        assert!(block.is_empty());
        assert_eq!(block.token_estimate, 0);
        assert!(block.citations.is_empty());
    }
}
