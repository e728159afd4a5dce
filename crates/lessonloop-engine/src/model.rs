//! Language model client used for simulated execution and hints.
//!
//! The engine only needs one capability from a model: send instructions plus
//! a payload, get text back. [`ModelClient`] is that seam; [`HttpModelClient`]
//! implements it against any OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{EngineError, ModelErrorKind, Result};

/// Upper bound on provider error text carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One request to a language model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    /// Fixed instructions sent as the system message.
    pub system_instructions: String,
    /// Payload sent as the user message.
    pub user_payload: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Ask the provider to answer with a single JSON object.
    pub json_response: bool,
}

impl ModelRequest {
    /// Creates a plain-text request.
    #[must_use]
    pub fn new(
        system_instructions: impl Into<String>,
        user_payload: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            user_payload: user_payload.into(),
            temperature,
            json_response: false,
        }
    }

    /// Requests a JSON-object answer.
    #[must_use]
    pub const fn expect_json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Something that can answer a [`ModelRequest`] with text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends the request and returns the model's answer.
    async fn complete(&self, request: ModelRequest) -> Result<String>;
}

/// [`ModelClient`] for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    requires_api_key: bool,
    timeout_secs: u64,
}

impl HttpModelClient {
    /// Builds a client from configuration, reading the API key from the
    /// environment variable named by `config.api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::with_api_key(config, api_key)
    }

    /// Builds a client with an explicit API key.
    pub fn with_api_key(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EngineError::model_api(ModelErrorKind::Other, e.to_string()))?;

        let endpoint = format!(
            "{}/chat/completions",
            config.resolved_base_url().trim_end_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            requires_api_key: config.provider.requires_api_key(),
            timeout_secs: config.timeout_seconds,
        })
    }

    /// The URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "system", "content": request.system_instructions },
                { "role": "user", "content": request.user_payload },
            ],
        });
        if request.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<String> {
        if self.requires_api_key && self.api_key.is_none() {
            return Err(EngineError::model_api(
                ModelErrorKind::Authentication,
                format!("environment variable '{}' is not set", self.api_key_env),
            ));
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            json_response = request.json_response,
            "Sending model request"
        );

        let mut builder = self.client.post(&self.endpoint).json(&self.body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::model_timeout(self.timeout_secs)
            } else {
                EngineError::model_api(ModelErrorKind::Network, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::model_api(
                ModelErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {}", truncate_chars(&text, MAX_ERROR_BODY_CHARS)),
            ));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| EngineError::model_response(e.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EngineError::model_response("response contained no message content"))
    }
}

/// Cuts `text` to at most `max` characters, marking the cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Scripted client for unit tests.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{async_trait, EngineError, ModelClient, ModelRequest, Result};

    /// Answers requests from a fixed queue and records what it was asked.
    #[derive(Debug, Default)]
    pub struct ScriptedModel {
        answers: Mutex<VecDeque<Result<String>>>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        pub fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn answering(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, request: ModelRequest) -> Result<String> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            self.answers
                .lock()
                .ok()
                .and_then(|mut answers| answers.pop_front())
                .unwrap_or_else(|| Err(EngineError::model_response("no scripted answer left")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ModelProvider;

    fn config_for(server: &mockito::Server) -> ModelConfig {
        ModelConfig {
            base_url: Some(server.url()),
            model: "test-model".to_string(),
            ..ModelConfig::default()
        }
    }

    const OK_BODY: &str = r#"{
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hello" } }]
    }"#;

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "be terse" },
                    { "role": "user", "content": "hi" },
                ],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(OK_BODY)
            .create_async()
            .await;

        let client =
            HttpModelClient::with_api_key(&config_for(&server), Some("test-key".to_string()))
                .unwrap();
        let answer = client
            .complete(ModelRequest::new("be terse", "hi", 0.1).expect_json())
            .await
            .unwrap();

        assert_eq!(answer, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_maps_to_error_kind() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client =
            HttpModelClient::with_api_key(&config_for(&server), Some("k".to_string())).unwrap();
        let err = client
            .complete(ModelRequest::new("s", "u", 0.1))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, EngineError::ModelApiError { kind: ModelErrorKind::RateLimit, message, .. }
                if message.contains("slow down")),
            "Expected rate limit error, got: {err:?}"
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_content_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let client =
            HttpModelClient::with_api_key(&config_for(&server), Some("k".to_string())).unwrap();
        let err = client
            .complete(ModelRequest::new("s", "u", 0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelResponseError { .. }));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let client = HttpModelClient::with_api_key(&ModelConfig::default(), None).unwrap();
        let err = client
            .complete(ModelRequest::new("s", "u", 0.1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::ModelApiError {
                kind: ModelErrorKind::Authentication,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ollama_needs_no_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(OK_BODY)
            .create_async()
            .await;

        let config = ModelConfig {
            provider: ModelProvider::Ollama,
            ..config_for(&server)
        };
        let client = HttpModelClient::with_api_key(&config, None).unwrap();
        assert_eq!(
            client.complete(ModelRequest::new("s", "u", 0.1)).await.unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = ModelConfig {
            base_url: Some("http://localhost:9999/v1/".to_string()),
            ..ModelConfig::default()
        };
        let client = HttpModelClient::with_api_key(&config, None).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("ééé", 2), "éé...");
    }
}
