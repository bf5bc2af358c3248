use thiserror::Error;

/// Top-level error type for the Scribe engine.
///
/// Configuration problems (`Validation`, `Retrieval`, `Config`) are raised to
/// the caller at load or query time. Conversation-level failures (`Service`,
/// `Permission`, `PlaybackUnavailable`) are converted into user-safe messages
/// or notifications by the component that owns them and never reach the
/// transcript verbatim.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScribeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Microphone permission denied: {0}")]
    Permission(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Speech synthesis is unavailable on this device")]
    PlaybackUnavailable,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ScribeError {
    fn from(err: toml::de::Error) -> Self {
        ScribeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScribeError {
    fn from(err: toml::ser::Error) -> Self {
        ScribeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(err: serde_json::Error) -> Self {
        ScribeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Scribe operations.
pub type Result<T> = std::result::Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(ScribeError, &str)> = vec![
            (
                ScribeError::Validation("duplicate chunk id: a".to_string()),
                "Validation error: duplicate chunk id: a",
            ),
            (
                ScribeError::Retrieval("document store is empty".to_string()),
                "Retrieval error: document store is empty",
            ),
            (
                ScribeError::Permission("user dismissed prompt".to_string()),
                "Microphone permission denied: user dismissed prompt",
            ),
            (
                ScribeError::Service("timed out".to_string()),
                "Service error: timed out",
            ),
            (
                ScribeError::PlaybackUnavailable,
                "Speech synthesis is unavailable on this device",
            ),
            (
                ScribeError::Capture("already recording".to_string()),
                "Capture error: already recording",
            ),
            (
                ScribeError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                ScribeError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScribeError = io_err.into();
        assert!(matches!(err, ScribeError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: ScribeError = err.unwrap_err().into();
        assert!(matches!(err, ScribeError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: ScribeError = err.unwrap_err().into();
        assert!(matches!(err, ScribeError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
