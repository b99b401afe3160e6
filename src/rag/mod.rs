//! Retrieval-augmented generation
//!
//! Knowledge corpus, embedding capability, the shared embedding index, the
//! retriever on top of it, and context assembly.

pub mod context;
pub mod embedder;
pub mod index;
pub mod knowledge;
pub mod retriever;

pub use context::{assemble, ContextBlock, ContextSection, SectionKind, StructuredData};
pub use embedder::{EmbeddingProvider, GeminiEmbedder, HashingEmbedder};
pub use index::{EmbeddingIndex, IndexSnapshot, ScoredArticle, SharedIndex};
pub use knowledge::{KnowledgeArticle, KnowledgeBase};
pub use retriever::{RetrievalResult, Retriever};
