//! Spoken quiz: ask a question aloud, check the recognized answer, speak
//! the verdict.

use std::sync::Arc;

use scribe_core::config::ScribeConfig;
use scribe_core::types::VoiceMessage;
use scribe_speech::{RecognitionSegment, SpeakOptions, SpeechPlayback};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CORRECT_FEEDBACK: &str = "Correct! Great job!";
pub const INCORRECT_FEEDBACK: &str = "That's not correct. Let's try again or review the notes.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub answer: String,
}

impl QuizQuestion {
    pub fn new(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }
}

/// Questions used when no quiz is supplied.
pub fn sample_questions() -> Vec<QuizQuestion> {
    vec![
        QuizQuestion::new("What is the capital of France?", "Paris"),
        QuizQuestion::new("Which planet is known as the Red Planet?", "Mars"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizFeedback {
    Correct,
    Incorrect,
}

impl QuizFeedback {
    pub fn spoken_text(&self) -> &'static str {
        match self {
            QuizFeedback::Correct => CORRECT_FEEDBACK,
            QuizFeedback::Incorrect => INCORRECT_FEEDBACK,
        }
    }
}

/// Case-insensitive whole-answer match. Surrounding whitespace and
/// punctuation added by the recognizer are ignored.
pub fn check_answer(expected: &str, given: &str) -> QuizFeedback {
    fn normalize(text: &str) -> String {
        text.trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
    }
    if normalize(expected) == normalize(given) {
        QuizFeedback::Correct
    } else {
        QuizFeedback::Incorrect
    }
}

/// Cycles through quiz questions, one spoken answer at a time.
pub struct VoiceQuiz {
    questions: Vec<QuizQuestion>,
    index: usize,
    feedback: Option<QuizFeedback>,
    playback: Option<Arc<SpeechPlayback>>,
    speak_options: SpeakOptions,
}

impl std::fmt::Debug for VoiceQuiz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceQuiz")
            .field("questions", &self.questions.len())
            .field("index", &self.index)
            .field("feedback", &self.feedback)
            .finish()
    }
}

impl VoiceQuiz {
    pub fn new(questions: Vec<QuizQuestion>, config: &ScribeConfig) -> Self {
        Self {
            questions,
            index: 0,
            feedback: None,
            playback: None,
            speak_options: SpeakOptions::from_config(&config.playback),
        }
    }

    pub fn with_playback(mut self, playback: Arc<SpeechPlayback>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn current(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Verdict on the latest answer to the current question.
    pub fn feedback(&self) -> Option<QuizFeedback> {
        self.feedback
    }

    /// Read the current question aloud.
    pub async fn ask(&self) {
        if let Some(question) = self.current() {
            let prompt = question.prompt.clone();
            self.say(&prompt).await;
        }
    }

    /// Check `transcript` against the current question and speak the verdict.
    ///
    /// `None` when the quiz has no questions.
    pub async fn answer(&mut self, transcript: &str) -> Option<QuizFeedback> {
        let expected = self.current()?.answer.clone();
        let feedback = check_answer(&expected, transcript);
        info!(index = self.index, ?feedback, "Quiz answer checked");
        self.feedback = Some(feedback);
        self.say(feedback.spoken_text()).await;
        Some(feedback)
    }

    /// Only final recognition results are checked; interim ones are ignored.
    pub async fn answer_segment(&mut self, segment: &RecognitionSegment) -> Option<QuizFeedback> {
        if !segment.is_final {
            debug!("Interim quiz answer ignored");
            return None;
        }
        self.answer(&segment.text).await
    }

    pub async fn answer_voice(&mut self, message: &VoiceMessage) -> Option<QuizFeedback> {
        self.answer(&message.transcript).await
    }

    /// Move to the next question, wrapping around, and ask it.
    pub async fn next(&mut self) {
        if self.questions.is_empty() {
            return;
        }
        self.index = (self.index + 1) % self.questions.len();
        self.feedback = None;
        self.ask().await;
    }

    pub async fn repeat(&self) {
        self.ask().await;
    }

    async fn say(&self, text: &str) {
        if let Some(playback) = &self.playback {
            if let Err(e) = playback.speak(text, self.speak_options.clone()).await {
                warn!("Quiz playback failed: {}", e);
            }
        }
    }
}
