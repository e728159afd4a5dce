//! LessonLoop Session Reports
//!
//! Types for describing what happened in one lesson session: every run with
//! its output and check results, plus the tutor conversation. Reports can be
//! serialized to JSON for tooling or rendered to Markdown for people.
//!
//! # Types
//!
//! - [`Report`] - A whole session
//! - [`ReportSummary`] - Headline numbers, derived by [`ReportBuilder`]
//! - [`RunRecord`] - One run: output, error, check results, hint
//! - [`TranscriptTurn`] - One line of the tutor conversation
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use lessonloop_report::{Report, ReportStatus, RunOrigin, RunRecord, MarkdownGenerator};
//!
//! let report = Report::builder()
//!     .lesson("variables", "Variables", "javascript")
//!     .user_id("ada")
//!     .status(ReportStatus::Completed)
//!     .phase("success")
//!     .run(
//!         RunRecord::new(1, RunOrigin::Native, true, 3)
//!             .output_line("log", "5", 1)
//!             .check(true, "Declare x using let"),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(report.summary.passing_runs, 1);
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# LessonLoop Session Report: Variables"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while building or writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write a report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The builder was missing required data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Status
// ============================================================================

/// Completion status of the learner on the lesson.
///
/// Mirrors the engine's completion status so this crate stays independent
/// of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// No run has been submitted.
    #[default]
    NotStarted,
    /// Runs were submitted but none passed every check.
    Attempted,
    /// A run passed every check.
    Completed,
}

impl ReportStatus {
    /// Human-readable description for summaries.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Attempted => "Attempted",
            Self::Completed => "Completed",
        }
    }

    /// Returns `true` if the lesson was completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Attempted => "attempted",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Report
// ============================================================================

/// The lesson a report is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonInfo {
    /// Lesson identifier.
    pub id: String,
    /// Lesson title.
    pub title: String,
    /// Language the lesson is written in.
    pub language: String,
}

/// A complete session report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// The lesson.
    pub lesson: LessonInfo,
    /// The learner.
    pub user_id: String,
    /// Headline numbers.
    pub summary: ReportSummary,
    /// Runs in submission order.
    pub runs: Vec<RunRecord>,
    /// Tutor conversation in order.
    pub transcript: Vec<TranscriptTurn>,
    /// When the report was assembled.
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Serializes the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// The last run, if any.
    #[must_use]
    pub fn latest_run(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    /// Returns `true` if any run's result was predicted rather than executed.
    #[must_use]
    pub fn has_predicted_runs(&self) -> bool {
        self.runs.iter().any(|r| r.origin != RunOrigin::Native)
    }
}

/// Headline numbers for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Completion status at the end of the session.
    pub status: ReportStatus,
    /// Tutor phase at the end of the session.
    pub phase: String,
    /// Number of runs.
    pub run_count: u32,
    /// Runs that succeeded and passed every check.
    pub passing_runs: u32,
    /// The run that first completed the lesson in this session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_on_run: Option<u32>,
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for [`Report`]. The summary is derived from the runs.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    lesson: Option<LessonInfo>,
    user_id: Option<String>,
    status: ReportStatus,
    phase: String,
    runs: Vec<RunRecord>,
    transcript: Vec<TranscriptTurn>,
    generated_at: Option<DateTime<Utc>>,
}

impl ReportBuilder {
    /// Sets the lesson.
    #[must_use]
    pub fn lesson(
        mut self,
        id: impl Into<String>,
        title: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        self.lesson = Some(LessonInfo {
            id: id.into(),
            title: title.into(),
            language: language.into(),
        });
        self
    }

    /// Sets the learner.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the final completion status.
    #[must_use]
    pub const fn status(mut self, status: ReportStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the final tutor phase.
    #[must_use]
    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Adds a run.
    #[must_use]
    pub fn run(mut self, run: RunRecord) -> Self {
        self.runs.push(run);
        self
    }

    /// Sets all runs at once.
    #[must_use]
    pub fn runs(mut self, runs: Vec<RunRecord>) -> Self {
        self.runs = runs;
        self
    }

    /// Adds a transcript turn.
    #[must_use]
    pub fn turn(mut self, turn: TranscriptTurn) -> Self {
        self.transcript.push(turn);
        self
    }

    /// Sets the whole transcript at once.
    #[must_use]
    pub fn transcript(mut self, transcript: Vec<TranscriptTurn>) -> Self {
        self.transcript = transcript;
        self
    }

    /// Pins the generation time. Defaults to now.
    #[must_use]
    pub const fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the lesson or learner is missing.
    pub fn build(self) -> Result<Report> {
        let lesson = self
            .lesson
            .filter(|l| !l.id.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("lesson is required".to_string()))?;

        let user_id = self
            .user_id
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("user_id is required".to_string()))?;

        let passing_runs = self.runs.iter().filter(|r| r.passed()).count();
        let summary = ReportSummary {
            status: self.status,
            phase: self.phase,
            run_count: u32::try_from(self.runs.len()).unwrap_or(u32::MAX),
            passing_runs: u32::try_from(passing_runs).unwrap_or(u32::MAX),
            completed_on_run: self
                .runs
                .iter()
                .find(|r| r.newly_completed)
                .map(|r| r.number),
        };

        Ok(Report {
            lesson,
            user_id,
            summary,
            runs: self.runs,
            transcript: self.transcript,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
        })
    }
}

// ============================================================================
// Runs
// ============================================================================

/// Where a run's result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    /// Executed in the sandbox.
    #[default]
    Native,
    /// Predicted by the model.
    Simulated,
    /// The prediction itself failed.
    SimulationFailed,
}

impl RunOrigin {
    /// Short label for summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Native => "executed",
            Self::Simulated => "predicted",
            Self::SimulationFailed => "prediction failed",
        }
    }
}

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Output channel: `log`, `error`, `warn` or `info`.
    pub kind: String,
    /// Rendered text.
    pub content: String,
    /// Milliseconds since the run started.
    pub offset_ms: u64,
}

/// Outcome of one lesson check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// Whether the check passed.
    pub passed: bool,
    /// The check's message.
    pub message: String,
}

/// One run of learner code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// 1-based run number within the session.
    pub number: u32,
    /// Where the result came from.
    pub origin: RunOrigin,
    /// Whether the program ran to completion without a fault.
    pub success: bool,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Fault message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Captured output.
    pub output: Vec<OutputLine>,
    /// Check outcomes in lesson order.
    pub checks: Vec<CheckRecord>,
    /// Hint shown after the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether this run completed the lesson for the first time.
    #[serde(default)]
    pub newly_completed: bool,
}

impl RunRecord {
    /// Creates a run with no output or checks.
    #[must_use]
    pub const fn new(number: u32, origin: RunOrigin, success: bool, duration_ms: u64) -> Self {
        Self {
            number,
            origin,
            success,
            duration_ms,
            error: None,
            output: Vec::new(),
            checks: Vec::new(),
            hint: None,
            newly_completed: false,
        }
    }

    /// Sets the fault message.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Appends an output line.
    #[must_use]
    pub fn output_line(
        mut self,
        kind: impl Into<String>,
        content: impl Into<String>,
        offset_ms: u64,
    ) -> Self {
        self.output.push(OutputLine {
            kind: kind.into(),
            content: content.into(),
            offset_ms,
        });
        self
    }

    /// Appends a check outcome.
    #[must_use]
    pub fn check(mut self, passed: bool, message: impl Into<String>) -> Self {
        self.checks.push(CheckRecord {
            passed,
            message: message.into(),
        });
        self
    }

    /// Sets the hint.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Marks the run as the one that completed the lesson.
    #[must_use]
    pub const fn completing(mut self) -> Self {
        self.newly_completed = true;
        self
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Returns `true` if the run succeeded and every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.success && self.checks.iter().all(|c| c.passed)
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// Who wrote a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The tutor.
    Tutor,
    /// The learner.
    Learner,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tutor => write!(f, "Tutor"),
            Self::Learner => write!(f, "Learner"),
        }
    }
}

/// One turn of the tutor conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// Who wrote it.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
    /// Presentation style: `text`, `success` or `error`.
    pub style: String,
}

impl TranscriptTurn {
    /// A plain tutor turn.
    #[must_use]
    pub fn tutor(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Tutor,
            text: text.into(),
            style: "text".to_string(),
        }
    }

    /// A learner turn.
    #[must_use]
    pub fn learner(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Learner,
            text: text.into(),
            style: "text".to_string(),
        }
    }

    /// Overrides the presentation style.
    #[must_use]
    pub fn styled(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
