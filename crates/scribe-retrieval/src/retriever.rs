//! Ranked retrieval over the document store.
//!
//! Two strategies share one result shape:
//! - [`LexicalRetriever`] - keyword overlap, offline.
//! - [`EmbeddingRetriever`] - cosine similarity against a prebuilt
//!   [`EmbeddingIndex`]; the query is embedded per call.
//!
//! [`Retriever`] picks one from [`RetrievalConfig`].

use std::collections::HashSet;
use std::sync::Arc;

use scribe_core::config::{RetrievalConfig, RetrievalStrategy};
use scribe_core::error::{Result, ScribeError};
use scribe_core::types::DocumentChunk;
use tracing::{debug, warn};

use crate::embedding::DynEmbeddingService;
use crate::index::EmbeddingIndex;
use crate::lexical::LexicalRetriever;
use crate::store::DocumentStore;

// =============================================================================
// Result types
// =============================================================================

/// A chunk paired with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// Hits ordered by descending score; ties keep corpus order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Distinct source names in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.hits
            .iter()
            .map(|h| h.chunk.metadata.source_name.as_str())
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    /// Chunk contents joined by blank lines, for use as prompt context.
    pub fn context(&self) -> String {
        self.hits
            .iter()
            .map(|h| h.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub(crate) fn ensure_searchable(store: &DocumentStore, limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(ScribeError::Validation(
            "retrieval limit must be greater than 0".to_string(),
        ));
    }
    if store.is_empty() {
        return Err(ScribeError::Retrieval(
            "document store is empty".to_string(),
        ));
    }
    Ok(())
}

/// Pair `scores` (in store order) with their chunks, drop those at or below
/// `min`, sort descending and keep at most `limit`.
pub(crate) fn rank(
    store: &DocumentStore,
    scores: Vec<f64>,
    limit: usize,
    min: Option<f64>,
) -> RetrievalResult {
    let mut hits: Vec<ScoredChunk> = store
        .all()
        .iter()
        .zip(scores)
        .filter(|(_, score)| min.map_or(true, |m| *score > m))
        .map(|(chunk, score)| ScoredChunk {
            chunk: chunk.clone(),
            // An unscorable chunk ranks as irrelevant rather than poisoning the sort.
            score: if score.is_nan() { 0.0 } else { score },
        })
        .collect();

    // Stable sort keeps corpus order among equal scores.
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);

    RetrievalResult { hits }
}

// =============================================================================
// EmbeddingRetriever
// =============================================================================

/// Similarity search over cached chunk vectors.
#[derive(Clone)]
pub struct EmbeddingRetriever {
    store: Arc<DocumentStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn DynEmbeddingService>,
}

impl std::fmt::Debug for EmbeddingRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRetriever")
            .field("chunks", &self.store.count())
            .field("vectors", &self.index.len())
            .finish()
    }
}

impl EmbeddingRetriever {
    /// Build the chunk index. Calls the embedding service once per chunk.
    pub async fn build(
        store: Arc<DocumentStore>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self> {
        let index = EmbeddingIndex::build(&store, embedder.as_ref()).await?;
        Ok(Self {
            store,
            index: Arc::new(index),
            embedder,
        })
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<RetrievalResult> {
        ensure_searchable(&self.store, limit)?;
        let query_vector = self.embedder.embed_boxed(query).await?;
        let scores = self.index.score_all(&query_vector);
        debug!(limit, "Embedding search scored {} chunks", scores.len());
        Ok(rank(&self.store, scores, limit, None))
    }
}

// =============================================================================
// Retriever
// =============================================================================

/// Retriever selected by configuration.
#[derive(Debug, Clone)]
pub enum Retriever {
    Lexical(LexicalRetriever),
    Embedding(EmbeddingRetriever),
}

impl Retriever {
    /// Build the configured strategy.
    ///
    /// The embedding strategy falls back to lexical when no service is given
    /// or the index build fails; this never returns an error.
    pub async fn from_config(
        config: &RetrievalConfig,
        store: Arc<DocumentStore>,
        embedder: Option<Arc<dyn DynEmbeddingService>>,
    ) -> Self {
        match (config.strategy, embedder) {
            (RetrievalStrategy::Lexical, _) => {
                Self::Lexical(LexicalRetriever::new(store, config.min_score))
            }
            (RetrievalStrategy::Embedding, None) => {
                warn!("Embedding retrieval requested without an embedding service; using lexical");
                Self::Lexical(LexicalRetriever::new(store, config.min_score))
            }
            (RetrievalStrategy::Embedding, Some(embedder)) => {
                match EmbeddingRetriever::build(store.clone(), embedder).await {
                    Ok(retriever) => Self::Embedding(retriever),
                    Err(e) => {
                        warn!("Embedding index build failed: {}. Using lexical", e);
                        Self::Lexical(LexicalRetriever::new(store, config.min_score))
                    }
                }
            }
        }
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        match self {
            Self::Lexical(_) => RetrievalStrategy::Lexical,
            Self::Embedding(_) => RetrievalStrategy::Embedding,
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<RetrievalResult> {
        match self {
            Self::Lexical(r) => r.search(query, limit),
            Self::Embedding(r) => r.search(query, limit).await,
        }
    }
}
