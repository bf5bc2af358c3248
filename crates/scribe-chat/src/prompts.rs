//! Mode system prompts, the question-answering template and greetings.

use scribe_core::config::PromptConfig;
use scribe_core::types::ConversationMode;

pub const STUDY_PROMPT: &str = "When a student asks a question, don't give the direct answer. \
Instead, ask a clarifying question or provide a hint that will help them discover the answer on \
their own. If the student gets stuck after 2 hints, then explain the answer step-by-step.";

pub const QUIZ_PROMPT: &str = "You are an engaging, supportive quizmaster for high school students.
Your job is to generate quiz questions about the course notes provided to you. Ask one question at a time, wait for the student's answer, and only then respond.
If the student answers correctly, give positive feedback and move to the next question.
If the student answers incorrectly, give a helpful hint or explanation, and allow them to try again.
Only reveal the correct answer after two incorrect attempts, or if the student asks for it.
Never provide the answer up front.
Always base your questions and hints strictly on the provided course notes.
Format:
State the question (multiple choice or short answer).
  Wait for student's answer.
Give appropriate feedback, hint, or move to next question.";

const QA_INSTRUCTION: &str = "Use the following context to answer the question. \
If you cannot answer based on the context, say so clearly.";

/// System prompt for `mode`, taking configured overrides into account.
pub fn system_prompt(mode: ConversationMode, overrides: &PromptConfig) -> &str {
    match mode {
        ConversationMode::Study => overrides.study.as_deref().unwrap_or(STUDY_PROMPT),
        ConversationMode::Quiz => overrides.quiz.as_deref().unwrap_or(QUIZ_PROMPT),
    }
}

/// Assemble the single prompt sent to the answering service.
pub fn build_prompt(system: &str, context: &str, question: &str) -> String {
    format!(
        "{system}\n\n{QA_INSTRUCTION}\n\nContext: {context}\n\nQuestion: {question}\n\nAnswer:"
    )
}

/// Greeting shown when a session opens or the mode changes.
pub fn welcome_message(mode: ConversationMode, advanced_ready: bool) -> String {
    let greeting = match mode {
        ConversationMode::Study => {
            "I'm here to help you study! Ask me questions about the course material."
        }
        ConversationMode::Quiz => {
            "Quiz mode activated! I'll ask you questions to test your knowledge."
        }
    };
    let status = if advanced_ready {
        " (Advanced retrieval active)"
    } else {
        " (Initialize advanced retrieval for enhanced features)"
    };
    format!("{greeting}{status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_defaults() {
        let overrides = PromptConfig::default();
        assert_eq!(system_prompt(ConversationMode::Study, &overrides), STUDY_PROMPT);
        assert_eq!(system_prompt(ConversationMode::Quiz, &overrides), QUIZ_PROMPT);
        assert!(STUDY_PROMPT.contains("don't give the direct answer"));
        assert!(QUIZ_PROMPT.contains("two incorrect attempts"));
    }

    #[test]
    fn test_system_prompt_override() {
        let overrides = PromptConfig {
            quiz: Some("Ask in French.".to_string()),
            ..PromptConfig::default()
        };
        assert_eq!(system_prompt(ConversationMode::Quiz, &overrides), "Ask in French.");
        assert_eq!(system_prompt(ConversationMode::Study, &overrides), STUDY_PROMPT);
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("Be kind.", "ATP is energy.", "What is ATP?");
        assert!(prompt.starts_with("Be kind.\n\nUse the following context"));
        assert!(prompt.contains("\n\nContext: ATP is energy.\n\nQuestion: What is ATP?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_welcome_message_per_mode() {
        assert_eq!(
            welcome_message(ConversationMode::Study, true),
            "I'm here to help you study! Ask me questions about the course material. (Advanced retrieval active)"
        );
        assert!(welcome_message(ConversationMode::Quiz, false)
            .starts_with("Quiz mode activated!"));
        assert!(welcome_message(ConversationMode::Quiz, false)
            .ends_with("(Initialize advanced retrieval for enhanced features)"));
    }
}
