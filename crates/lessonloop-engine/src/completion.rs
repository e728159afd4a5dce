//! Lesson completion status and what each run does to it.
//!
//! [`decide`] is pure: it looks at the current status, the run result and the
//! verdicts, and says what the new status is, what to persist, whether to
//! celebrate and whether to ask for a hint. The session applies the decision
//! once every stage of the run has finished.

use serde::{Deserialize, Serialize};

use crate::grader::{all_passed, failing_messages, CheckVerdict};
use crate::output::{ExecutionResult, ResultOrigin};
use crate::progress::LessonProgress;

/// Where a learner stands on a lesson.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// No run yet.
    #[default]
    NotStarted,
    /// At least one run, not yet passed.
    Attempted,
    /// Passed. Never left once entered.
    Completed,
}

impl CompletionStatus {
    /// Status a new session starts in, given the stored record.
    #[must_use]
    pub fn from_progress(progress: Option<&LessonProgress>) -> Self {
        match progress {
            Some(p) if p.completed => Self::Completed,
            Some(_) => Self::Attempted,
            None => Self::NotStarted,
        }
    }

    /// Returns `true` once the lesson has been passed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Attempted => write!(f, "attempted"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Why a hint is being requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintReason {
    /// The program faulted with this message.
    Fault(String),
    /// The program ran but these checks failed.
    FailingChecks(Vec<String>),
}

impl HintReason {
    /// The lines handed to the hint service as "failing checks".
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Self::Fault(message) => vec![format!("The program failed with: {message}")],
            Self::FailingChecks(messages) => messages,
        }
    }
}

/// What one run does to completion state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionDecision {
    /// Status after the run.
    pub status: CompletionStatus,
    /// Value of `completed` to persist with the submitted code.
    pub persist_completed: bool,
    /// The lesson was passed by this run, and not before.
    pub newly_completed: bool,
    /// Hint to request, if any.
    pub hint: Option<HintReason>,
}

/// Decides the completion outcome of one run.
#[must_use]
pub fn decide(
    current: CompletionStatus,
    result: &ExecutionResult,
    verdicts: &[CheckVerdict],
) -> CompletionDecision {
    let already_completed = current.is_completed();
    let settled = if already_completed {
        CompletionStatus::Completed
    } else {
        CompletionStatus::Attempted
    };

    if !result.success {
        let hint = if already_completed || result.origin == ResultOrigin::SimulationFailed {
            None
        } else {
            Some(result.error.clone().map_or_else(
                || HintReason::FailingChecks(failing_messages(verdicts)),
                HintReason::Fault,
            ))
        };
        return CompletionDecision {
            status: settled,
            persist_completed: already_completed,
            newly_completed: false,
            hint,
        };
    }

    if all_passed(verdicts) {
        return CompletionDecision {
            status: CompletionStatus::Completed,
            persist_completed: true,
            newly_completed: !already_completed,
            hint: None,
        };
    }

    CompletionDecision {
        status: settled,
        persist_completed: already_completed,
        newly_completed: false,
        hint: (!already_completed).then(|| HintReason::FailingChecks(failing_messages(verdicts))),
    }
}
