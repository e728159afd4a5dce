//! Grades submitted source text against a lesson's checks.

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lesson::LessonCheck;

/// Pass/fail result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVerdict {
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable message for the learner.
    pub message: String,
}

impl CheckVerdict {
    /// A passing verdict.
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    /// A failing verdict.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Evaluates every check against `source`.
///
/// Verdicts come back in the same order as `checks`, one per check. Patterns
/// are matched in multiline mode against the raw source, never the program
/// output, and may use lookaround and backreferences. Checks that cannot be
/// evaluated (unknown kinds, patterns that do not compile, matches that hit
/// the backtracking limit) pass with a message saying so.
#[must_use]
pub fn grade(source: &str, checks: &[LessonCheck]) -> Vec<CheckVerdict> {
    checks.iter().map(|check| grade_one(source, check)).collect()
}

/// Returns `true` if every verdict passed. An empty set counts as passing.
#[must_use]
pub fn all_passed(verdicts: &[CheckVerdict]) -> bool {
    verdicts.iter().all(|v| v.passed)
}

/// Messages of the failing verdicts, in order.
#[must_use]
pub fn failing_messages(verdicts: &[CheckVerdict]) -> Vec<String> {
    verdicts
        .iter()
        .filter(|v| !v.passed)
        .map(|v| v.message.clone())
        .collect()
}

fn grade_one(source: &str, check: &LessonCheck) -> CheckVerdict {
    match check {
        LessonCheck::SourcePattern { pattern, message } => {
            let matched = Regex::new(&format!("(?m){pattern}"))
                .and_then(|re| re.is_match(source));
            match matched {
                Ok(true) => CheckVerdict::pass(message.clone()),
                Ok(false) => CheckVerdict::fail(message.clone()),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Check pattern could not be evaluated");
                    CheckVerdict::pass(format!(
                        "Check skipped: invalid pattern '{pattern}' ({message})"
                    ))
                }
            }
        }
        LessonCheck::Unrecognized { kind, message } => {
            tracing::debug!(kind = %kind, "Unrecognized check kind");
            CheckVerdict::pass(format!("Check skipped: unrecognized check kind '{kind}' ({message})"))
        }
    }
}
