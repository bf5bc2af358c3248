//! Chunk embedding index with brute-force cosine similarity scoring.
//!
//! One vector per chunk, aligned with the store's order. Building the index
//! calls the embedding service once per chunk; queries never re-embed the
//! corpus.

use scribe_core::error::{Result, ScribeError};
use tracing::{debug, info};

use crate::embedding::DynEmbeddingService;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Embed every chunk of `store`, in store order.
    ///
    /// Any embedding failure aborts the build; a partially built index is
    /// never returned.
    pub async fn build(store: &DocumentStore, embedder: &dyn DynEmbeddingService) -> Result<Self> {
        let mut vectors = Vec::with_capacity(store.count());
        for chunk in store.all() {
            let vector = embedder.embed_boxed(&chunk.content).await.map_err(|e| {
                ScribeError::Service(format!("failed to embed chunk {}: {}", chunk.id, e))
            })?;
            debug!(chunk = %chunk.id, dimensions = vector.len(), "Chunk embedded");
            vectors.push(vector);
        }

        info!(vectors = vectors.len(), "Embedding index built");
        Ok(Self { vectors })
    }

    /// Cosine similarity of `query` against every chunk, in store order.
    pub fn score_all(&self, query: &[f32]) -> Vec<f64> {
        self.vectors
            .iter()
            .map(|v| cosine_similarity(query, v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
