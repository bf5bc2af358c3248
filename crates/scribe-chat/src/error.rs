use scribe_core::error::ScribeError;
use thiserror::Error;

/// Errors returned to callers of the turn controller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a turn is already awaiting a response")]
    TurnInProgress,
    #[error(transparent)]
    Engine(#[from] ScribeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );
        assert_eq!(
            ChatError::TurnInProgress.to_string(),
            "a turn is already awaiting a response"
        );
    }

    #[test]
    fn test_chat_error_from_scribe_error() {
        let err: ChatError = ScribeError::Retrieval("document store is empty".to_string()).into();
        assert!(matches!(err, ChatError::Engine(ScribeError::Retrieval(_))));
        assert_eq!(err.to_string(), "Retrieval error: document store is empty");
    }
}
