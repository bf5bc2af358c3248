//! Keyword-overlap retrieval. Deterministic and offline.

use std::collections::HashSet;
use std::sync::Arc;

use scribe_core::error::Result;

use crate::retriever::{ensure_searchable, rank, RetrievalResult};
use crate::store::DocumentStore;

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Scores chunks by the fraction of distinct query terms they contain.
///
/// Chunk term sets are computed once at construction.
#[derive(Debug, Clone)]
pub struct LexicalRetriever {
    store: Arc<DocumentStore>,
    chunk_terms: Vec<HashSet<String>>,
    min_score: f64,
}

impl LexicalRetriever {
    pub fn new(store: Arc<DocumentStore>, min_score: f64) -> Self {
        let chunk_terms = store
            .all()
            .iter()
            .map(|c| tokenize(&c.content).collect())
            .collect();
        Self {
            store,
            chunk_terms,
            min_score,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Score of every chunk in store order, each in `0.0..=1.0`.
    pub fn score_all(&self, query: &str) -> Vec<f64> {
        let query_terms: HashSet<String> = tokenize(query).collect();
        if query_terms.is_empty() {
            return vec![0.0; self.chunk_terms.len()];
        }

        self.chunk_terms
            .iter()
            .map(|terms| {
                let matched = query_terms.iter().filter(|t| terms.contains(*t)).count();
                matched as f64 / query_terms.len() as f64
            })
            .collect()
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<RetrievalResult> {
        ensure_searchable(&self.store, limit)?;
        let scores = self.score_all(query);
        Ok(rank(&self.store, scores, limit, Some(self.min_score)))
    }
}
