use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Corpus
// =============================================================================

/// Provenance of a chunk within the administrator-supplied corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// Name of the file the chunk was cut from.
    #[serde(alias = "fileName", alias = "source_name")]
    pub source_name: String,
    /// Position of the chunk within its source file.
    #[serde(alias = "chunk_index")]
    pub chunk_index: u32,
}

/// One retrievable unit of the corpus. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source_name: impl Into<String>,
        chunk_index: u32,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: ChunkMetadata {
                source_name: source_name.into(),
                chunk_index,
            },
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Conversation mode; selects the system prompt for a whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Tutoring: hints first, full explanations only after repeated difficulty.
    #[default]
    Study,
    /// Quizmaster: one question at a time with feedback.
    Quiz,
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationMode::Study => write!(f, "study"),
            ConversationMode::Quiz => write!(f, "quiz"),
        }
    }
}

impl std::str::FromStr for ConversationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(ConversationMode::Study),
            "quiz" => Ok(ConversationMode::Quiz),
            other => Err(format!("unknown conversation mode: {other}")),
        }
    }
}

/// Speaker of a transcript turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Time-ordered unique identifier of a transcript turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to a recorded voice message.
///
/// A completed capture always produces a clip, even when no buffers arrived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One utterance in the append-only transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioClip>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, audio: Option<AudioClip>) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::User,
            text: text.into(),
            audio,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::Assistant,
            text: text.into(),
            audio: None,
            created_at: Utc::now(),
        }
    }
}

/// Result of a finished speech capture: the recording plus its transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceMessage {
    pub audio: AudioClip,
    /// Final recognized text, trimmed; empty when nothing was recognized.
    pub transcript: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_deserializes_from_admin_document_format() {
        let json = r#"{
            "id": "admin-welcome-0",
            "content": "Welcome to the vocal knowledge scribe.",
            "metadata": { "fileName": "admin-welcome.txt", "chunkIndex": 0 }
        }"#;
        let chunk: DocumentChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.id, "admin-welcome-0");
        assert_eq!(chunk.metadata.source_name, "admin-welcome.txt");
        assert_eq!(chunk.metadata.chunk_index, 0);
    }

    #[test]
    fn test_chunk_serializes_camel_case_metadata() {
        let chunk = DocumentChunk::new("c-1", "text", "notes.txt", 3);
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["metadata"]["sourceName"], "notes.txt");
        assert_eq!(value["metadata"]["chunkIndex"], 3);
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Quiz".parse::<ConversationMode>().unwrap(), ConversationMode::Quiz);
        assert_eq!(" study ".parse::<ConversationMode>().unwrap(), ConversationMode::Study);
        assert!("exam".parse::<ConversationMode>().is_err());
        assert_eq!(ConversationMode::Quiz.to_string(), "quiz");
        assert_eq!(ConversationMode::default(), ConversationMode::Study);
    }

    #[test]
    fn test_turn_ids_are_unique() {
        let ids: std::collections::HashSet<TurnId> = (0..100).map(|_| TurnId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_turn_constructors() {
        let clip = AudioClip::new(vec![1, 2, 3], "audio/wav");
        let user = ConversationTurn::user("hi", Some(clip.clone()));
        assert_eq!(user.role, Role::User);
        assert_eq!(user.audio, Some(clip));

        let assistant = ConversationTurn::assistant("hello");
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.audio.is_none());
    }

    #[test]
    fn test_empty_audio_clip() {
        let clip = AudioClip::new(Vec::new(), "audio/wav");
        assert!(clip.is_empty());
        assert_eq!(clip.len(), 0);
    }
}
