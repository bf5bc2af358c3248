//! Response synthesis: retrieve, prompt, complete, attribute.
//!
//! The synthesizer owns the retrieval fallback. Lexical retrieval is always
//! available; embedding retrieval is used only when requested and its index
//! has been built, and a failing query embedding drops back to lexical for
//! that turn. Answering failures never reach the caller as errors: they are
//! logged and replaced by a fixed apology.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use scribe_core::config::{PromptConfig, ScribeConfig};
use scribe_core::error::Result;
use scribe_core::types::ConversationMode;
use scribe_retrieval::{
    DocumentStore, DynEmbeddingService, EmbeddingRetriever, LexicalRetriever, RetrievalResult,
};
use tracing::{debug, error, info, warn};

use crate::answering::DynAnsweringService;
use crate::prompts::{build_prompt, system_prompt};

pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an error while processing your question. Please try again.";

pub const INITIALIZE_ADVANCED_TEXT: &str =
    "Please initialize the advanced retrieval system (embedding service) first.";

pub const EMPTY_QUERY_TEXT: &str =
    "I didn't catch that. Could you type or say your question again?";

/// Final reply text plus the distinct sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub sources: Vec<String>,
}

impl SynthesizedAnswer {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
        }
    }
}

pub struct ResponseSynthesizer {
    store: Arc<DocumentStore>,
    lexical: LexicalRetriever,
    embedding: RwLock<Option<EmbeddingRetriever>>,
    answering: Arc<dyn DynAnsweringService>,
    prompts: PromptConfig,
    top_k: usize,
    timeout: Duration,
}

impl std::fmt::Debug for ResponseSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSynthesizer")
            .field("chunks", &self.store.count())
            .field("top_k", &self.top_k)
            .field("timeout", &self.timeout)
            .field("advanced_ready", &self.is_advanced_ready())
            .finish()
    }
}

impl ResponseSynthesizer {
    pub fn new(
        store: Arc<DocumentStore>,
        answering: Arc<dyn DynAnsweringService>,
        config: &ScribeConfig,
    ) -> Self {
        Self {
            lexical: LexicalRetriever::new(store.clone(), config.retrieval.min_score),
            store,
            embedding: RwLock::new(None),
            answering,
            prompts: config.prompts.clone(),
            top_k: config.retrieval.top_k,
            timeout: Duration::from_secs(config.answering.timeout_secs),
        }
    }

    /// Use an already built embedding retriever for advanced turns.
    pub fn with_embedding(self, retriever: EmbeddingRetriever) -> Self {
        self.set_embedding(retriever);
        self
    }

    fn set_embedding(&self, retriever: EmbeddingRetriever) {
        *self
            .embedding
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(retriever);
    }

    /// Build the embedding index over the corpus, enabling advanced turns.
    ///
    /// On failure the synthesizer keeps its previous state.
    pub async fn initialize_embeddings(&self, embedder: Arc<dyn DynEmbeddingService>) -> Result<()> {
        let retriever = EmbeddingRetriever::build(self.store.clone(), embedder).await?;
        self.set_embedding(retriever);
        info!(chunks = self.store.count(), "Advanced retrieval initialized");
        Ok(())
    }

    pub fn is_advanced_ready(&self) -> bool {
        self.embedding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Answer `query` in `mode`.
    ///
    /// Errors only on retrieval misconfiguration, such as an empty corpus.
    pub async fn answer(
        &self,
        query: &str,
        mode: ConversationMode,
        use_advanced: bool,
    ) -> Result<SynthesizedAnswer> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SynthesizedAnswer::plain(EMPTY_QUERY_TEXT));
        }

        let retrieved = if use_advanced {
            let embedding = self
                .embedding
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let Some(embedding) = embedding else {
                debug!("Advanced retrieval requested before initialization");
                return Ok(SynthesizedAnswer::plain(INITIALIZE_ADVANCED_TEXT));
            };
            match embedding.search(query, self.top_k).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Embedding retrieval failed, falling back to lexical: {}", e);
                    self.lexical.search(query, self.top_k)?
                }
            }
        } else {
            self.lexical.search(query, self.top_k)?
        };
        debug!(hits = retrieved.len(), %mode, "Context retrieved");

        let prompt = build_prompt(
            system_prompt(mode, &self.prompts),
            &retrieved.context(),
            query,
        );

        let completion =
            tokio::time::timeout(self.timeout, self.answering.complete_boxed(&prompt)).await;
        match completion {
            Ok(Ok(text)) => Ok(attribute(text, &retrieved)),
            Ok(Err(e)) => {
                error!("Answering service failed: {}", e);
                Ok(SynthesizedAnswer::plain(APOLOGY_TEXT))
            }
            Err(_) => {
                error!(timeout_secs = self.timeout.as_secs(), "Answering service timed out");
                Ok(SynthesizedAnswer::plain(APOLOGY_TEXT))
            }
        }
    }
}

fn attribute(text: String, retrieved: &RetrievalResult) -> SynthesizedAnswer {
    let sources = retrieved.sources();
    let text = if sources.is_empty() {
        text
    } else {
        format!("{}\n\nSources: {}", text, sources.join(", "))
    };
    SynthesizedAnswer { text, sources }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answering::MockAnsweringService;
    use crate::prompts::{QUIZ_PROMPT, STUDY_PROMPT};
    use scribe_core::error::ScribeError;
    use scribe_core::types::DocumentChunk;
    use scribe_retrieval::{EmbeddingService, MockEmbedding};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Arc<DocumentStore> {
        Arc::new(
            DocumentStore::load(vec![
                DocumentChunk::new("bio-0", "Mitochondria produce ATP for the cell.", "bio.txt", 0),
                DocumentChunk::new("bio-1", "Ribosomes build proteins inside the cell.", "bio.txt", 1),
                DocumentChunk::new("chem-0", "ATP stores chemical energy.", "chem.txt", 0),
            ])
            .unwrap(),
        )
    }

    fn synthesizer(answering: &MockAnsweringService) -> ResponseSynthesizer {
        ResponseSynthesizer::new(store(), Arc::new(answering.clone()), &ScribeConfig::default())
    }

    /// Embeds normally for the first `ok_calls` calls, then fails.
    struct FlakyEmbedding {
        inner: MockEmbedding,
        ok_calls: usize,
        calls: AtomicUsize,
    }

    impl EmbeddingService for FlakyEmbedding {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ScribeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
                return Err(ScribeError::Service("embedding quota exceeded".to_string()));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            64
        }
    }

    #[tokio::test]
    async fn test_answer_appends_deduplicated_sources() {
        let answering = MockAnsweringService::replying("ATP is the energy currency.");
        let synth = synthesizer(&answering);

        let answer = synth
            .answer("what is ATP in the cell", ConversationMode::Study, false)
            .await
            .unwrap();

        assert_eq!(answer.sources, vec!["bio.txt", "chem.txt"]);
        assert_eq!(
            answer.text,
            "ATP is the energy currency.\n\nSources: bio.txt, chem.txt"
        );
        assert_eq!(answering.call_count(), 1);
    }

    #[tokio::test]
    async fn test_prompt_uses_mode_template_and_context() {
        let answering = MockAnsweringService::replying("ok");
        let synth = synthesizer(&answering);

        synth
            .answer("ribosomes", ConversationMode::Study, false)
            .await
            .unwrap();
        synth
            .answer("ribosomes", ConversationMode::Quiz, false)
            .await
            .unwrap();

        let prompts = answering.prompts();
        assert!(prompts[0].starts_with(STUDY_PROMPT));
        assert!(prompts[1].starts_with(QUIZ_PROMPT));
        assert!(prompts[0].contains("Context: Ribosomes build proteins inside the cell."));
        assert!(prompts[0].contains("Question: ribosomes"));
    }

    #[tokio::test]
    async fn test_no_hits_omits_sources_line() {
        let answering = MockAnsweringService::replying("I cannot answer that from the notes.");
        let synth = synthesizer(&answering);

        let answer = synth
            .answer("photosynthesis", ConversationMode::Study, false)
            .await
            .unwrap();

        assert_eq!(answer.text, "I cannot answer that from the notes.");
        assert!(answer.sources.is_empty());
        assert_eq!(answering.call_count(), 1);
    }

    #[tokio::test]
    async fn test_quiz_advanced_uninitialized_makes_no_calls() {
        let answering = MockAnsweringService::replying("unused");
        let synth = synthesizer(&answering);

        let answer = synth
            .answer("quiz me on the cell", ConversationMode::Quiz, true)
            .await
            .unwrap();

        assert_eq!(answer.text, INITIALIZE_ADVANCED_TEXT);
        assert!(answer.sources.is_empty());
        assert_eq!(answering.call_count(), 0);
    }

    #[tokio::test]
    async fn test_service_failure_becomes_apology() {
        let answering = MockAnsweringService::failing("HTTP 500 internal error");
        let synth = synthesizer(&answering);

        let answer = synth
            .answer("what is ATP", ConversationMode::Study, false)
            .await
            .unwrap();

        assert_eq!(answer.text, APOLOGY_TEXT);
        assert!(!answer.text.contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_timeout_becomes_apology() {
        let answering = MockAnsweringService::replying("too late").with_delay(Duration::from_secs(60));
        let synth = synthesizer(&answering);

        let answer = synth
            .answer("what is ATP", ConversationMode::Study, false)
            .await
            .unwrap();

        assert_eq!(answer.text, APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_blank_query_skips_service() {
        let answering = MockAnsweringService::replying("unused");
        let synth = synthesizer(&answering);

        let answer = synth.answer("   ", ConversationMode::Study, true).await.unwrap();

        assert_eq!(answer.text, EMPTY_QUERY_TEXT);
        assert_eq!(answering.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_an_error() {
        let answering = MockAnsweringService::replying("unused");
        let synth = ResponseSynthesizer::new(
            Arc::new(DocumentStore::default()),
            Arc::new(answering.clone()),
            &ScribeConfig::default(),
        );

        let err = synth
            .answer("anything", ConversationMode::Study, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::Retrieval(_)));
        assert_eq!(answering.call_count(), 0);
    }

    #[tokio::test]
    async fn test_initialized_embeddings_are_used() {
        let answering = MockAnsweringService::echoing();
        let synth = synthesizer(&answering);
        let embedder = MockEmbedding::new();

        assert!(!synth.is_advanced_ready());
        synth
            .initialize_embeddings(Arc::new(embedder.clone()))
            .await
            .unwrap();
        assert!(synth.is_advanced_ready());
        assert_eq!(embedder.call_count(), 3);

        let answer = synth
            .answer("ATP stores chemical energy.", ConversationMode::Study, true)
            .await
            .unwrap();

        // Exact text match ranks first under cosine similarity.
        assert!(answer.text.starts_with("ATP stores chemical energy."));
        assert_eq!(answer.sources[0], "chem.txt");
        assert_eq!(embedder.call_count(), 4);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_falls_back_to_lexical() {
        let answering = MockAnsweringService::echoing();
        let synth = synthesizer(&answering);
        let embedder = FlakyEmbedding {
            inner: MockEmbedding::new(),
            ok_calls: 3,
            calls: AtomicUsize::new(0),
        };
        synth.initialize_embeddings(Arc::new(embedder)).await.unwrap();

        let answer = synth
            .answer("ribosomes", ConversationMode::Study, true)
            .await
            .unwrap();

        assert_eq!(answer.sources, vec!["bio.txt"]);
        assert!(answer.text.starts_with("Ribosomes build proteins inside the cell."));
    }

    #[tokio::test]
    async fn test_initialization_survives_poisoned_lock() {
        let answering = MockAnsweringService::replying("ok");
        let synth = Arc::new(synthesizer(&answering));

        let poisoner = synth.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.embedding.write().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(synth.embedding.is_poisoned());

        synth
            .initialize_embeddings(Arc::new(MockEmbedding::new()))
            .await
            .unwrap();
        assert!(synth.is_advanced_ready());
        let answer = synth
            .answer("Ribosomes build proteins inside the cell.", ConversationMode::Study, true)
            .await
            .unwrap();
        assert_eq!(answer.sources[0], "bio.txt");
    }

    #[tokio::test]
    async fn test_failed_initialization_keeps_advanced_disabled() {
        let answering = MockAnsweringService::replying("unused");
        let synth = synthesizer(&answering);
        let embedder = FlakyEmbedding {
            inner: MockEmbedding::new(),
            ok_calls: 1,
            calls: AtomicUsize::new(0),
        };

        assert!(synth.initialize_embeddings(Arc::new(embedder)).await.is_err());
        assert!(!synth.is_advanced_ready());
    }
}
