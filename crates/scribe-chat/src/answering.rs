//! Answering (text completion) service.
//!
//! One prompt in, one completion out. `OpenAiAnsweringService` talks to an
//! OpenAI-compatible chat completions endpoint; `MockAnsweringService`
//! scripts replies for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scribe_core::config::AnsweringConfig;
use scribe_core::error::ScribeError;
use serde::Deserialize;
use tracing::{debug, info};

pub trait AnsweringService: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, ScribeError>> + Send;
}

/// Object-safe version of [`AnsweringService`].
pub trait DynAnsweringService: Send + Sync {
    fn complete_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ScribeError>> + Send + 'a>>;
}

impl<T: AnsweringService> DynAnsweringService for T {
    fn complete_boxed<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ScribeError>> + Send + 'a>> {
        Box::pin(self.complete(prompt))
    }
}

// ---------------------------------------------------------------------------
// OpenAiAnsweringService
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LlmResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

pub struct OpenAiAnsweringService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl std::fmt::Debug for OpenAiAnsweringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAnsweringService")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiAnsweringService {
    pub fn new(config: &AnsweringConfig, api_key: String) -> Result<Self, ScribeError> {
        if api_key.trim().is_empty() {
            return Err(ScribeError::Service(
                "answering API key is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScribeError::Service(format!("answering client: {}", e)))?;

        info!(model = %config.model, endpoint = %config.endpoint, "Answering service configured");

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    /// Build from the API key in the environment variable named by
    /// `config.api_key_env`.
    pub fn from_env(config: &AnsweringConfig) -> Result<Self, ScribeError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ScribeError::Service(format!("{} is not set", config.api_key_env)))?;
        Self::new(config, api_key)
    }
}

impl AnsweringService for OpenAiAnsweringService {
    async fn complete(&self, prompt: &str) -> Result<String, ScribeError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScribeError::Service(format!("answering request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ScribeError::Service(format!("answering request rejected: {}", e)))?
            .json::<LlmResponse>()
            .await
            .map_err(|e| ScribeError::Service(format!("answering response: {}", e)))?;

        let answer = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ScribeError::Service("answering response had no choices".to_string()))?;

        debug!(chars = answer.len(), "Completion received");
        Ok(answer)
    }
}

// ---------------------------------------------------------------------------
// MockAnsweringService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(String),
    Echo,
    Fail(String),
}

/// Scripted answering service. Clones share the call log.
#[derive(Debug, Clone)]
pub struct MockAnsweringService {
    behavior: MockBehavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockAnsweringService {
    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Reply(reply.into()))
    }

    /// Answers with the prompt's context section, so tests can see what was
    /// retrieved.
    pub fn echoing() -> Self {
        Self::with_behavior(MockBehavior::Echo)
    }

    /// Always fails with a service error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Fail(message.into()))
    }

    /// Time each call takes before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl AnsweringService for MockAnsweringService {
    async fn complete(&self, prompt: &str) -> Result<String, ScribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            MockBehavior::Reply(reply) => Ok(reply.clone()),
            MockBehavior::Echo => Ok(prompt
                .split("\n\nQuestion:")
                .next()
                .and_then(|head| head.rsplit("Context: ").next())
                .unwrap_or_default()
                .to_string()),
            MockBehavior::Fail(message) => Err(ScribeError::Service(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reply_and_count() {
        let service = MockAnsweringService::replying("42");
        let shared = service.clone();
        assert_eq!(service.complete("q").await.unwrap(), "42");
        assert_eq!(shared.complete("r").await.unwrap(), "42");
        assert_eq!(service.call_count(), 2);
        assert_eq!(service.prompts(), vec!["q", "r"]);
    }

    #[tokio::test]
    async fn test_mock_echo_returns_context() {
        let service = MockAnsweringService::echoing();
        let answer = service
            .complete("sys\n\nContext: ATP is energy.\n\nQuestion: what?\n\nAnswer:")
            .await
            .unwrap();
        assert_eq!(answer, "ATP is energy.");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let service: Arc<dyn DynAnsweringService> =
            Arc::new(MockAnsweringService::failing("rate limited"));
        let err = service.complete_boxed("q").await.unwrap_err();
        assert!(matches!(err, ScribeError::Service(_)));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let err = OpenAiAnsweringService::new(&AnsweringConfig::default(), String::new())
            .unwrap_err();
        assert!(matches!(err, ScribeError::Service(_)));
    }

    #[test]
    fn test_openai_from_env_missing_variable() {
        let config = AnsweringConfig {
            api_key_env: "SCRIBE_TEST_ANSWERING_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AnsweringConfig::default()
        };
        assert!(OpenAiAnsweringService::from_env(&config).is_err());
    }
}
