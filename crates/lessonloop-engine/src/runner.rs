//! Chooses between the sandbox and simulated execution for a submission.

use async_trait::async_trait;

use crate::output::ExecutionResult;
use crate::sandbox::Sandbox;
use crate::simulate::Simulator;

/// Language names the in-process interpreter handles.
const NATIVE_LANGUAGES: &[&str] = &["javascript", "js", "node", "mjs"];

/// Runs a submission and reports what happened.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Executes `code` written in `language`. Never fails; faults are part of
    /// the returned result.
    async fn execute(&self, code: &str, language: &str) -> ExecutionResult;
}

/// Returns `true` if `language` runs in the in-process sandbox.
#[must_use]
pub fn has_native_interpreter(language: &str) -> bool {
    let language = language.trim();
    NATIVE_LANGUAGES
        .iter()
        .any(|native| native.eq_ignore_ascii_case(language))
}

/// Sends native languages to the [`Sandbox`] and everything else to the
/// [`Simulator`].
#[derive(Debug, Clone)]
pub struct ExecutionRouter {
    sandbox: Sandbox,
    simulator: Simulator,
}

impl ExecutionRouter {
    /// Creates a router over both execution paths.
    #[must_use]
    pub const fn new(sandbox: Sandbox, simulator: Simulator) -> Self {
        Self { sandbox, simulator }
    }
}

#[async_trait]
impl CodeRunner for ExecutionRouter {
    async fn execute(&self, code: &str, language: &str) -> ExecutionResult {
        if has_native_interpreter(language) {
            tracing::debug!(language, "Running in sandbox");
            self.sandbox.run(code).await
        } else {
            tracing::debug!(language, "Running simulated execution");
            self.simulator.simulate(code, language).await
        }
    }
}
