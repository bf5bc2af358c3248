//! Guided study: step through study notes one at a time.
//!
//! Each note is read aloud when it comes up. The student can ask for the
//! note explained differently or as an analogy, must confirm understanding
//! before moving on, and can drive all of it by voice commands.

use std::sync::Arc;
use std::time::Duration;

use scribe_core::config::ScribeConfig;
use scribe_core::error::{Result, ScribeError};
use scribe_speech::{SpeakOptions, SpeechPlayback};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::answering::DynAnsweringService;
use crate::synthesizer::APOLOGY_TEXT;

/// One step of a guided study walkthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyNote {
    pub id: u32,
    pub content: String,
    /// Check-for-understanding question shown with the note.
    pub question: String,
}

impl StudyNote {
    pub fn new(id: u32, content: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            question: question.into(),
        }
    }
}

/// Built-in notes used when no study notes are supplied.
pub fn default_study_notes() -> Vec<StudyNote> {
    vec![
        StudyNote::new(
            1,
            "Photosynthesis allows plants to convert sunlight into energy-rich molecules using water and carbon dioxide.",
            "What do plants produce during photosynthesis?",
        ),
        StudyNote::new(
            2,
            "Mitochondria are organelles that generate ATP, the main energy currency of the cell.",
            "Which organelle is responsible for making ATP in most cells?",
        ),
        StudyNote::new(
            3,
            "DNA is composed of nucleotides arranged in a double helix. It carries genetic information.",
            "What molecule stores genetic information in cells?",
        ),
    ]
}

pub fn rephrase_prompt(content: &str) -> String {
    format!("Rephrase or simplify the following explanation:\n\n{content}")
}

pub fn analogy_prompt(content: &str) -> String {
    format!("Provide an analogy to help a student understand: {content}")
}

/// Spoken command recognized during guided study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyCommand {
    ExplainDifferently,
    Analogy,
    Next,
}

impl StudyCommand {
    /// Commands contained in a recognized utterance, in a fixed order.
    pub fn detect(transcript: &str) -> Vec<StudyCommand> {
        let text = transcript.to_lowercase();
        let mut commands = Vec::new();
        if text.contains("explain differently") {
            commands.push(StudyCommand::ExplainDifferently);
        }
        if text.contains("give me an analogy") {
            commands.push(StudyCommand::Analogy);
        }
        if text.contains("next") {
            commands.push(StudyCommand::Next);
        }
        commands
    }
}

/// Walks a student through a list of study notes.
pub struct GuidedStudy {
    notes: Vec<StudyNote>,
    step: usize,
    understood: bool,
    latest_response: Option<String>,
    answering: Arc<dyn DynAnsweringService>,
    playback: Option<Arc<SpeechPlayback>>,
    speak_options: SpeakOptions,
    timeout: Duration,
}

impl std::fmt::Debug for GuidedStudy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuidedStudy")
            .field("notes", &self.notes.len())
            .field("step", &self.step)
            .field("understood", &self.understood)
            .finish()
    }
}

impl GuidedStudy {
    pub fn new(
        notes: Vec<StudyNote>,
        answering: Arc<dyn DynAnsweringService>,
        config: &ScribeConfig,
    ) -> Self {
        Self {
            notes,
            step: 0,
            understood: false,
            latest_response: None,
            answering,
            playback: None,
            speak_options: SpeakOptions::from_config(&config.playback),
            timeout: Duration::from_secs(config.answering.timeout_secs),
        }
    }

    /// Read notes and generated explanations aloud through `playback`.
    pub fn with_playback(mut self, playback: Arc<SpeechPlayback>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Note being studied, or `None` once every note is done.
    pub fn current(&self) -> Option<&StudyNote> {
        self.notes.get(self.step)
    }

    /// Zero-based index of the current note.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_complete(&self) -> bool {
        self.current().is_none()
    }

    pub fn is_understood(&self) -> bool {
        self.understood
    }

    /// Last explanation or analogy generated for the current note.
    pub fn latest_response(&self) -> Option<&str> {
        self.latest_response.as_deref()
    }

    /// Read the current note aloud.
    pub async fn announce(&self) {
        if let Some(note) = self.current() {
            let content = note.content.clone();
            self.say(&content).await;
        }
    }

    pub fn mark_understood(&mut self) {
        self.understood = true;
    }

    /// Move to the next note. Only allowed once the current one is
    /// understood; returns whether the walkthrough moved.
    pub async fn next(&mut self) -> bool {
        if self.is_complete() || !self.understood {
            debug!(step = self.step, "Next ignored until the note is understood");
            return false;
        }
        self.step += 1;
        self.understood = false;
        self.latest_response = None;
        if self.is_complete() {
            info!(notes = self.notes.len(), "Guided study completed");
        } else {
            info!(step = self.step, "Guided study advanced");
            self.announce().await;
        }
        true
    }

    /// Ask for the current note in simpler words.
    pub async fn explain_differently(&mut self) -> Result<String> {
        let note = self.note_for_request()?;
        self.respond(rephrase_prompt(&note.content)).await
    }

    /// Ask for an analogy for the current note.
    pub async fn analogy(&mut self) -> Result<String> {
        let note = self.note_for_request()?;
        self.respond(analogy_prompt(&note.content)).await
    }

    /// Run every command found in a recognized utterance.
    ///
    /// Returns the commands that were run.
    pub async fn handle_transcript(&mut self, transcript: &str) -> Result<Vec<StudyCommand>> {
        let commands = StudyCommand::detect(transcript);
        for command in &commands {
            match command {
                StudyCommand::ExplainDifferently => {
                    self.explain_differently().await?;
                }
                StudyCommand::Analogy => {
                    self.analogy().await?;
                }
                StudyCommand::Next => {
                    self.next().await;
                }
            }
        }
        Ok(commands)
    }

    fn note_for_request(&self) -> Result<StudyNote> {
        self.current()
            .cloned()
            .ok_or_else(|| ScribeError::Validation("all study notes are completed".to_string()))
    }

    async fn respond(&mut self, prompt: String) -> Result<String> {
        let completion =
            tokio::time::timeout(self.timeout, self.answering.complete_boxed(&prompt)).await;
        let text = match completion {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(e)) => {
                error!("Answering service failed: {}", e);
                APOLOGY_TEXT.to_string()
            }
            Err(_) => {
                error!(timeout_secs = self.timeout.as_secs(), "Answering service timed out");
                APOLOGY_TEXT.to_string()
            }
        };
        self.latest_response = Some(text.clone());
        self.say(&text).await;
        Ok(text)
    }

    async fn say(&self, text: &str) {
        if let Some(playback) = &self.playback {
            if let Err(e) = playback.speak(text, self.speak_options.clone()).await {
                warn!("Guided study playback failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answering::MockAnsweringService;
    use scribe_core::config::PlaybackConfig;
    use scribe_speech::MockSynthesizer;

    fn guided(answering: &MockAnsweringService) -> GuidedStudy {
        GuidedStudy::new(
            default_study_notes(),
            Arc::new(answering.clone()),
            &ScribeConfig::default(),
        )
    }

    #[test]
    fn test_prompt_builders() {
        assert_eq!(
            rephrase_prompt("ATP is energy."),
            "Rephrase or simplify the following explanation:\n\nATP is energy."
        );
        assert_eq!(
            analogy_prompt("ATP is energy."),
            "Provide an analogy to help a student understand: ATP is energy."
        );
    }

    #[test]
    fn test_detect_commands() {
        assert_eq!(
            StudyCommand::detect("Could you EXPLAIN DIFFERENTLY please"),
            vec![StudyCommand::ExplainDifferently]
        );
        assert_eq!(
            StudyCommand::detect("give me an analogy and then next"),
            vec![StudyCommand::Analogy, StudyCommand::Next]
        );
        assert!(StudyCommand::detect("what is ATP").is_empty());
    }

    #[tokio::test]
    async fn test_next_requires_understanding() {
        let answering = MockAnsweringService::replying("unused");
        let mut study = guided(&answering);

        assert!(!study.next().await);
        assert_eq!(study.step(), 0);

        study.mark_understood();
        assert!(study.next().await);
        assert_eq!(study.step(), 1);
        assert!(!study.is_understood());
        assert!(study.current().unwrap().content.starts_with("Mitochondria"));
    }

    #[tokio::test]
    async fn test_walkthrough_completes() {
        let answering = MockAnsweringService::replying("unused");
        let mut study = guided(&answering);

        for _ in 0..3 {
            study.mark_understood();
            assert!(study.next().await);
        }

        assert!(study.is_complete());
        assert!(!study.next().await);
        assert!(matches!(
            study.explain_differently().await,
            Err(ScribeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_explain_and_analogy_prompts() {
        let answering = MockAnsweringService::replying("  Plants cook with light.  ");
        let mut study = guided(&answering);

        let explained = study.explain_differently().await.unwrap();
        study.analogy().await.unwrap();

        assert_eq!(explained, "Plants cook with light.");
        assert_eq!(study.latest_response(), Some("Plants cook with light."));
        let prompts = answering.prompts();
        assert!(prompts[0].starts_with("Rephrase or simplify"));
        assert!(prompts[0].ends_with("using water and carbon dioxide."));
        assert!(prompts[1].starts_with("Provide an analogy"));
    }

    #[tokio::test]
    async fn test_service_failure_becomes_apology() {
        let answering = MockAnsweringService::failing("quota");
        let mut study = guided(&answering);

        assert_eq!(study.analogy().await.unwrap(), APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_voice_commands_drive_walkthrough() {
        let answering = MockAnsweringService::replying("Like a power plant.");
        let mut study = guided(&answering);

        let ran = study.handle_transcript("give me an analogy").await.unwrap();
        assert_eq!(ran, vec![StudyCommand::Analogy]);
        assert_eq!(answering.call_count(), 1);

        // Not yet understood, so "next" is ignored.
        study.handle_transcript("next").await.unwrap();
        assert_eq!(study.step(), 0);

        study.mark_understood();
        study.handle_transcript("next please").await.unwrap();
        assert_eq!(study.step(), 1);
        assert_eq!(study.latest_response(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notes_and_responses_are_spoken() {
        let answering = MockAnsweringService::replying("Like a solar panel.");
        let synth = MockSynthesizer::new();
        let playback = Arc::new(SpeechPlayback::new(
            Arc::new(synth.clone()),
            PlaybackConfig::default(),
        ));
        let mut study = guided(&answering).with_playback(playback.clone());

        study.announce().await;
        playback.wait().await;
        study.analogy().await.unwrap();
        playback.wait().await;

        let spoken = synth.spoken_texts();
        assert!(spoken[0].starts_with("Photosynthesis"));
        assert_eq!(spoken.last().map(String::as_str), Some("Like a solar panel."));
    }
}
