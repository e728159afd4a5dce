//! Simulated execution for languages without an in-process interpreter.
//!
//! The program is sent to a language model that predicts what a standard
//! interpreter or compiler would print. The prediction is validated against a
//! fixed JSON contract and normalized into the same [`ExecutionResult`] shape
//! the sandbox produces. A broken model channel is never raised to the
//! caller; it comes back as a result tagged [`ResultOrigin::SimulationFailed`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::SimulationConfig;
use crate::model::{truncate_chars, ModelClient, ModelRequest};
use crate::output::{ExecutionResult, OutputEntry, OutputKind, OutputLog, ResultOrigin};

/// Prefix of every error produced when the model channel fails.
pub const SIMULATION_FAILED_PREFIX: &str = "Simulation failed:";

/// Bound on the reason text carried in a simulation failure.
const MAX_FAILURE_CHARS: usize = 300;

const SIMULATION_INSTRUCTIONS: &str = "\
You are a code execution engine. Predict exactly what running the given program \
would print, as a standard interpreter or compiler for the given language would.

Rules:
- Report stdout and stderr lines in the order the program produces them.
- If the program has a syntax or compile error, report the error the standard \
toolchain would print and produce no other output.
- If the program throws at runtime, report the output produced before the fault \
and the fault message.
- If the program would loop forever, stop after a reasonable number of iterations \
and add a final output line warning that execution was cut short.
- Do not explain, do not fix the program, do not add commentary.

Respond with a single JSON object and nothing else, with exactly these fields:
{\"output\": [string, ...], \"error\": string or null, \"success\": boolean}";

/// Matches a reply wrapped in a markdown code fence and captures the body.
static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$").ok());

/// The JSON contract the model must answer with.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Prediction {
    output: Vec<String>,
    #[serde(default)]
    error: Option<String>,
    success: bool,
}

#[derive(Debug, serde::Serialize)]
struct Payload<'a> {
    language: &'a str,
    code: &'a str,
}

/// Predicts program behavior with a language model.
#[derive(Clone)]
pub struct Simulator {
    client: Arc<dyn ModelClient>,
    config: SimulationConfig,
    timeout: Duration,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Creates a simulator that gives the model `timeout` to answer.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, config: SimulationConfig, timeout: Duration) -> Self {
        Self {
            client,
            config,
            timeout,
        }
    }

    /// Predicts the result of running `code` written in `language`.
    pub async fn simulate(&self, code: &str, language: &str) -> ExecutionResult {
        if ExecutionResult::is_blank(code) {
            return ExecutionResult::no_code(ResultOrigin::Simulated);
        }

        let started = Instant::now();
        let payload = serde_json::to_string(&Payload { language, code })
            .unwrap_or_else(|_| format!("language: {language}\n\n{code}"));
        let request = ModelRequest::new(SIMULATION_INSTRUCTIONS, payload, self.config.temperature)
            .expect_json();

        let answer = match tokio::time::timeout(self.timeout, self.client.complete(request)).await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                let message = e.to_string();
                let headline = message.lines().next().unwrap_or_default();
                return failed(headline, elapsed_ms(started));
            }
            Err(_) => {
                return failed(
                    &format!("model did not answer within {}s", self.timeout.as_secs()),
                    elapsed_ms(started),
                )
            }
        };

        let duration_ms = elapsed_ms(started);
        match parse_prediction(&answer) {
            Ok(prediction) => {
                let result = self.normalize(prediction, duration_ms);
                tracing::debug!(
                    language,
                    success = result.success,
                    lines = result.output.len(),
                    duration_ms,
                    "Simulated execution finished"
                );
                result
            }
            Err(reason) => failed(&reason, duration_ms),
        }
    }

    fn normalize(&self, prediction: Prediction, duration_ms: f64) -> ExecutionResult {
        let mut log = OutputLog::with_capacity(self.config.max_output_lines);
        for line in &prediction.output {
            log.push(
                OutputKind::Log,
                truncate_chars(line, self.config.max_line_length),
                duration_ms,
            );
        }
        let mut output = log.finish();

        let error = prediction
            .error
            .filter(|e| !e.trim().is_empty())
            .map(|e| truncate_chars(&e, self.config.max_line_length));

        match error {
            Some(error) => {
                output.push(OutputEntry::new(OutputKind::Error, error.clone(), duration_ms));
                ExecutionResult::faulted(output, error, duration_ms, ResultOrigin::Simulated)
            }
            None if prediction.success => {
                ExecutionResult::completed(output, duration_ms, ResultOrigin::Simulated)
            }
            None => ExecutionResult {
                output,
                error: None,
                success: false,
                duration_ms,
                origin: ResultOrigin::Simulated,
            },
        }
    }
}

/// Removes a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str().trim())
}

fn parse_prediction(answer: &str) -> Result<Prediction, String> {
    let body = strip_code_fence(answer);
    if body.is_empty() {
        return Err("model returned an empty response".to_string());
    }
    serde_json::from_str(body).map_err(|e| format!("model response did not match the contract: {e}"))
}

fn failed(reason: &str, duration_ms: f64) -> ExecutionResult {
    tracing::warn!(reason, "Simulated execution failed");
    ExecutionResult::faulted(
        Vec::new(),
        format!(
            "{SIMULATION_FAILED_PREFIX} {}",
            truncate_chars(reason, MAX_FAILURE_CHARS)
        ),
        duration_ms,
        ResultOrigin::SimulationFailed,
    )
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
