//! Conversational core for Scribe.
//!
//! Turns user questions (typed or spoken) into grounded answers: retrieval
//! over the administrator corpus, a mode-specific prompt, one answering
//! service call, and source attribution. The [`TurnController`] sequences
//! turns and publishes session events for the presentation layer.

pub mod answering;
pub mod controller;
pub mod error;
pub mod guided;
pub mod prompts;
pub mod quiz;
pub mod synthesizer;

pub use answering::{
    AnsweringService, DynAnsweringService, MockAnsweringService, OpenAiAnsweringService,
};
pub use controller::{PendingTurn, TurnController, TurnControllerBuilder, TurnState};
pub use error::ChatError;
pub use guided::{
    analogy_prompt, default_study_notes, rephrase_prompt, GuidedStudy, StudyCommand, StudyNote,
};
pub use prompts::{build_prompt, system_prompt, welcome_message};
pub use quiz::{check_answer, sample_questions, QuizFeedback, QuizQuestion, VoiceQuiz};
pub use synthesizer::{ResponseSynthesizer, SynthesizedAnswer};
