use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScribeError};
use crate::types::ConversationMode;

/// Top-level configuration for the Scribe engine.
///
/// Loaded from `~/.scribe/config.toml` by default. Every section falls back
/// to its defaults when missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answering: AnsweringConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl ScribeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScribeConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing or
    /// invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the engine misbehave at run time.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(ScribeError::Config(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        if self.playback.max_chunk_chars == 0 {
            return Err(ScribeError::Config(
                "playback.max_chunk_chars must be greater than 0".to_string(),
            ));
        }
        if self.conversation.max_message_length == 0 {
            return Err(ScribeError::Config(
                "conversation.max_message_length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// JSON corpus file; the built-in administrator corpus is used when unset.
    pub corpus_path: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            corpus_path: None,
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Mode for new sessions.
    pub mode: ConversationMode,
    /// Prefer embedding retrieval when it has been initialized.
    pub use_advanced: bool,
    /// Maximum accepted user message length in characters.
    pub max_message_length: usize,
    /// Transcript label shown for voice messages with no recognized text.
    pub voice_placeholder: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            mode: ConversationMode::Study,
            use_advanced: false,
            max_message_length: 2000,
            voice_placeholder: "[Voice message]".to_string(),
        }
    }
}

/// Retrieval strategy tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Keyword overlap; offline and deterministic.
    #[default]
    Lexical,
    /// Cosine similarity over embedding vectors.
    Embedding,
}

/// Retriever settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: RetrievalStrategy,
    /// Number of chunks handed to the answering service per turn.
    pub top_k: usize,
    /// Lexical hits must score strictly above this value.
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Lexical,
            top_k: 3,
            min_score: 0.0,
        }
    }
}

/// Answering (text completion) service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsweringConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on a single answering call.
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for AnsweringConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            timeout_secs: 30,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint.
    pub endpoint: String,
    pub model: String,
    /// Vector length produced by `model`.
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout_secs: 30,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How long `stop` waits for the recorder and recognizer to flush.
    pub finalize_timeout_ms: u64,
    /// MIME type attached to assembled recordings.
    pub mime_type: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            finalize_timeout_ms: 2000,
            mime_type: "audio/wav".to_string(),
        }
    }
}

/// Speech playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial value of the "read answers aloud" preference.
    pub speak_replies: bool,
    /// Character budget of a single synthesis request.
    pub max_chunk_chars: usize,
    /// Exact voice name to prefer.
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Substrings of voice names known to sound better than the default.
    pub preferred_voice_patterns: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speak_replies: false,
            max_chunk_chars: 200,
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            preferred_voice_patterns: vec!["Google".to_string()],
        }
    }
}

/// Optional overrides of the built-in mode system prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub study: Option<String>,
    pub quiz: Option<String>,
}
