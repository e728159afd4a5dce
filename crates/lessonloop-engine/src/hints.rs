//! Hint generation for failed runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::HintConfig;
use crate::model::{truncate_chars, ModelClient, ModelRequest};

/// Captured output beyond this many characters is cut before it is sent.
const MAX_CAPTURED_OUTPUT_CHARS: usize = 4_000;

/// Hint text beyond this many characters is cut before it reaches the tutor.
const MAX_HINT_CHARS: usize = 1_200;

const HINT_INSTRUCTIONS: &str = "\
You are a patient programming tutor. A learner's submission did not pass the \
lesson yet. Give one short hint (two or three sentences) that points them toward \
the next step. Refer to the failing requirements or the error when useful. \
Never write the solution code and never reveal the full answer.";

/// Everything the hint service is told about a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRequest {
    /// Lesson title.
    pub lesson_title: String,
    /// Lesson description.
    pub description: String,
    /// The submitted code.
    pub code: String,
    /// Failing check messages, or the fault message for a faulted run.
    pub failing_checks: Vec<String>,
    /// Output captured from the run.
    pub captured_output: String,
}

/// Produces hint text for a failed run.
#[async_trait]
pub trait HintProvider: Send + Sync {
    /// Returns a hint, or `None` when no hint is available. Failures degrade
    /// to `None`.
    async fn request_hint(&self, request: &HintRequest) -> Option<String>;
}

/// Provider used when hints are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

#[async_trait]
impl HintProvider for NoHints {
    async fn request_hint(&self, _request: &HintRequest) -> Option<String> {
        None
    }
}

/// Asks a language model for hints.
#[derive(Clone)]
pub struct ModelHintProvider {
    client: Arc<dyn ModelClient>,
    config: HintConfig,
    timeout: Duration,
}

impl std::fmt::Debug for ModelHintProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHintProvider")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelHintProvider {
    /// Creates a provider backed by `client`.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, config: HintConfig, timeout: Duration) -> Self {
        Self {
            client,
            config,
            timeout,
        }
    }

    fn payload(request: &HintRequest) -> String {
        let mut payload = format!(
            "Lesson: {}\n{}\n\nSubmitted code:\n{}\n",
            request.lesson_title, request.description, request.code
        );
        if !request.failing_checks.is_empty() {
            payload.push_str("\nNot yet satisfied:\n");
            for check in &request.failing_checks {
                payload.push_str("- ");
                payload.push_str(check);
                payload.push('\n');
            }
        }
        if !request.captured_output.trim().is_empty() {
            payload.push_str("\nProgram output:\n");
            payload.push_str(&truncate_chars(
                &request.captured_output,
                MAX_CAPTURED_OUTPUT_CHARS,
            ));
            payload.push('\n');
        }
        payload
    }
}

#[async_trait]
impl HintProvider for ModelHintProvider {
    async fn request_hint(&self, request: &HintRequest) -> Option<String> {
        let model_request =
            ModelRequest::new(HINT_INSTRUCTIONS, Self::payload(request), self.config.temperature);

        match tokio::time::timeout(self.timeout, self.client.complete(model_request)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(truncate_chars(text, MAX_HINT_CHARS))
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, lesson = %request.lesson_title, "Hint request failed");
                None
            }
            Err(_) => {
                tracing::warn!(lesson = %request.lesson_title, "Hint request timed out");
                None
            }
        }
    }
}
