//! Embedding service trait and implementations.
//!
//! - `OpenAiEmbeddingService` calls an OpenAI-compatible `/v1/embeddings`
//!   endpoint. This is the production backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scribe_core::config::EmbeddingConfig;
use scribe_core::error::ScribeError;
use serde::Deserialize;
use tracing::{debug, info};

/// Service converting text into fixed-length vectors.
///
/// Used once per chunk when the embedding index is built and once per query.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, ScribeError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and is therefore not
/// object-safe; this trait boxes the future so that
/// `Arc<dyn DynEmbeddingService>` can be stored without generics. Every
/// `EmbeddingService` implements it through the blanket impl below.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, ScribeError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, ScribeError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// OpenAiEmbeddingService
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// HTTP client for an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbeddingService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

impl std::fmt::Debug for OpenAiEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingService")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OpenAiEmbeddingService {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, ScribeError> {
        if api_key.trim().is_empty() {
            return Err(ScribeError::Service(
                "embedding API key is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScribeError::Service(format!("embedding client: {}", e)))?;

        info!(model = %config.model, endpoint = %config.endpoint, "Embedding service configured");

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            dimensions: config.dimensions,
        })
    }

    /// Build from the API key stored in the environment variable named by
    /// `config.api_key_env`.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self, ScribeError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ScribeError::Service(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(config, api_key)
    }
}

impl EmbeddingService for OpenAiEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScribeError> {
        if text.is_empty() {
            return Err(ScribeError::Service("Cannot embed empty text".to_string()));
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScribeError::Service(format!("embedding request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ScribeError::Service(format!("embedding request rejected: {}", e)))?
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| ScribeError::Service(format!("embedding response: {}", e)))?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ScribeError::Service("embedding response was empty".to_string()))?;

        debug!(dimensions = vector.len(), "Embedding received");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding
// ---------------------------------------------------------------------------

/// Mock embedding service returning deterministic 64-dimensional unit vectors.
///
/// Vectors are derived from a hash of the input, so identical texts embed to
/// identical vectors. Clones share a call counter.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding {
    calls: Arc<AtomicUsize>,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` calls made through this service or its clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(64);
        for i in 0..64 {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.is_empty() {
            return Err(ScribeError::Service("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.len(), 64);
    }

    #[tokio::test]
    async fn test_mock_embedding_different_inputs() {
        let service = MockEmbedding::new();
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let service = MockEmbedding::new();
        let v = service.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_call_count_shared_by_clones() {
        let service = MockEmbedding::new();
        let clone = service.clone();
        service.embed("a").await.unwrap();
        clone.embed("b").await.unwrap();
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_dyn_dispatch() {
        let service: Arc<dyn DynEmbeddingService> = Arc::new(MockEmbedding::new());
        let v = service.embed_boxed("boxed").await.unwrap();
        assert_eq!(v.len(), service.dimensions());
    }

    #[test]
    fn test_openai_requires_api_key() {
        let err = OpenAiEmbeddingService::new(&EmbeddingConfig::default(), "  ".to_string())
            .unwrap_err();
        assert!(matches!(err, ScribeError::Service(_)));
    }

    #[test]
    fn test_openai_from_env_missing_variable() {
        let config = EmbeddingConfig {
            api_key_env: "SCRIBE_TEST_EMBEDDING_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(OpenAiEmbeddingService::from_env(&config).is_err());
    }
}
