//! Scribe retrieval crate - document store, lexical and embedding retrieval.
//!
//! The corpus is loaded once into an immutable [`DocumentStore`]. A
//! [`Retriever`] ranks its chunks against a query using either keyword
//! overlap or cosine similarity over cached embedding vectors.

pub mod embedding;
pub mod index;
pub mod lexical;
pub mod retriever;
pub mod store;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding, OpenAiEmbeddingService};
pub use index::EmbeddingIndex;
pub use lexical::LexicalRetriever;
pub use retriever::{EmbeddingRetriever, RetrievalResult, Retriever, ScoredChunk};
pub use store::DocumentStore;
