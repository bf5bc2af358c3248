//! In-memory document store holding the administrator corpus.

use std::collections::HashSet;

use scribe_core::error::{Result, ScribeError};
use scribe_core::types::DocumentChunk;
use tracing::info;

/// Immutable set of corpus chunks, in load order.
///
/// Populated once at startup and shared behind an `Arc` afterwards; there is
/// no mutation API.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    chunks: Vec<DocumentChunk>,
}

impl DocumentStore {
    /// Validate and take ownership of the corpus.
    ///
    /// Fails with `ScribeError::Validation` on an empty or duplicated id.
    pub fn load(chunks: Vec<DocumentChunk>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            if chunk.id.trim().is_empty() {
                return Err(ScribeError::Validation(
                    "chunk id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(chunk.id.as_str()) {
                return Err(ScribeError::Validation(format!(
                    "duplicate chunk id: {}",
                    chunk.id
                )));
            }
        }

        info!(chunks = chunks.len(), "Document store loaded");
        Ok(Self { chunks })
    }

    /// Parse a JSON array of chunks and load it.
    pub fn from_json(json: &str) -> Result<Self> {
        let chunks: Vec<DocumentChunk> = serde_json::from_str(json)?;
        Self::load(chunks)
    }

    pub fn all(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DocumentChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> DocumentChunk {
        DocumentChunk::new(id, format!("content of {}", id), "notes.txt", 0)
    }

    #[test]
    fn test_load_preserves_order() {
        let store = DocumentStore::load(vec![chunk("b"), chunk("a"), chunk("c")]).unwrap();
        let ids: Vec<&str> = store.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(store.count(), 3);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let err = DocumentStore::load(vec![chunk("a"), chunk("b"), chunk("a")]).unwrap_err();
        assert!(matches!(err, ScribeError::Validation(_)));
        assert!(err.to_string().contains("duplicate chunk id: a"));
    }

    #[test]
    fn test_blank_id_is_rejected() {
        let err = DocumentStore::load(vec![chunk("  ")]).unwrap_err();
        assert!(matches!(err, ScribeError::Validation(_)));
    }

    #[test]
    fn test_empty_corpus_loads() {
        let store = DocumentStore::load(Vec::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_get_by_id() {
        let store = DocumentStore::load(vec![chunk("a"), chunk("b")]).unwrap();
        assert_eq!(store.get("b").unwrap().content, "content of b");
        assert!(store.get("zzz").is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"id": "admin-welcome-0", "content": "Welcome.", "metadata": {"fileName": "admin-welcome.txt", "chunkIndex": 0}},
            {"id": "admin-info-1", "content": "Info.", "metadata": {"sourceName": "admin-info.txt", "chunkIndex": 0}}
        ]"#;
        let store = DocumentStore::from_json(json).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.all()[1].metadata.source_name, "admin-info.txt");
    }

    #[test]
    fn test_from_json_malformed() {
        let err = DocumentStore::from_json("[{\"id\": 1}]").unwrap_err();
        assert!(matches!(err, ScribeError::Serialization(_)));
    }
}
