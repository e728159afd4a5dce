//! Captured program output shared by the sandbox and the simulated fallback.
//!
//! An [`OutputLog`] is the append-only record of what a run printed. It keeps
//! entry offsets non-decreasing and enforces the per-run entry cap, so every
//! producer gets those guarantees without re-implementing them.

use serde::{Deserialize, Serialize};

/// Error message reported when a run is requested for empty source text.
pub const NO_CODE_ERROR: &str = "No code to execute";

/// Kind of a captured output entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// `console.log` / `console.debug` / predicted stdout.
    Log,
    /// `console.error` or a fault message.
    Error,
    /// `console.warn` or an engine notice.
    Warn,
    /// `console.info`.
    Info,
    /// The value returned by the program body.
    Result,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Result => write!(f, "result"),
        }
    }
}

/// One captured event from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    /// What produced the entry.
    pub kind: OutputKind,
    /// Already-rendered text of the entry.
    pub content: String,
    /// Milliseconds since the run started.
    pub offset_ms: f64,
}

impl OutputEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(kind: OutputKind, content: impl Into<String>, offset_ms: f64) -> Self {
        Self {
            kind,
            content: content.into(),
            offset_ms,
        }
    }
}

/// Append-only, capped sequence of [`OutputEntry`] records for one run.
#[derive(Debug, Clone)]
pub struct OutputLog {
    entries: Vec<OutputEntry>,
    capacity: usize,
    dropped: usize,
}

impl OutputLog {
    /// Creates an empty log that keeps at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Appends an entry.
    ///
    /// Negative or non-finite offsets are clamped to zero, and an offset
    /// earlier than the previous entry is raised to match it. Returns `false`
    /// when the log is full and the entry was dropped.
    pub fn push(&mut self, kind: OutputKind, content: impl Into<String>, offset_ms: f64) -> bool {
        if self.entries.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }

        let floor = self.entries.last().map_or(0.0, |e| e.offset_ms);
        let offset_ms = if offset_ms.is_finite() {
            offset_ms.max(floor)
        } else {
            floor
        };

        self.entries.push(OutputEntry::new(kind, content, offset_ms));
        true
    }

    /// Records entries a producer rejected before they reached the log.
    pub fn note_dropped(&mut self, count: usize) {
        self.dropped += count;
    }

    /// Consumes the log, appending a truncation notice if entries were dropped.
    #[must_use]
    pub fn finish(mut self) -> Vec<OutputEntry> {
        if self.dropped > 0 {
            let offset_ms = self.entries.last().map_or(0.0, |e| e.offset_ms);
            let notice = format!(
                "Output truncated: {} more entries were not captured",
                self.dropped
            );
            self.entries
                .push(OutputEntry::new(OutputKind::Warn, notice, offset_ms));
        }
        self.entries
    }
}

/// Where an [`ExecutionResult`] came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrigin {
    /// Produced by the in-process interpreter.
    #[default]
    Native,
    /// Predicted by the language model.
    Simulated,
    /// The model channel failed; nothing is known about the program.
    SimulationFailed,
}

impl ResultOrigin {
    /// Returns `true` for results that are model predictions rather than runs.
    #[must_use]
    pub const fn is_prediction(&self) -> bool {
        matches!(self, Self::Simulated | Self::SimulationFailed)
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Captured output, in production order.
    pub output: Vec<OutputEntry>,
    /// Fault message; only ever set when `success` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the program ran without a fault.
    pub success: bool,
    /// Wall time spent producing the result.
    pub duration_ms: f64,
    /// Which path produced the result.
    #[serde(default)]
    pub origin: ResultOrigin,
}

impl ExecutionResult {
    /// Successful run with the given output.
    #[must_use]
    pub const fn completed(output: Vec<OutputEntry>, duration_ms: f64, origin: ResultOrigin) -> Self {
        Self {
            output,
            error: None,
            success: true,
            duration_ms,
            origin,
        }
    }

    /// Faulted run: keeps whatever was emitted before the fault.
    #[must_use]
    pub fn faulted(
        output: Vec<OutputEntry>,
        error: impl Into<String>,
        duration_ms: f64,
        origin: ResultOrigin,
    ) -> Self {
        Self {
            output,
            error: Some(error.into()),
            success: false,
            duration_ms,
            origin,
        }
    }

    /// Result for empty or whitespace-only source text.
    #[must_use]
    pub fn no_code(origin: ResultOrigin) -> Self {
        Self::faulted(Vec::new(), NO_CODE_ERROR, 0.0, origin)
    }

    /// Returns `true` if the source text is empty after trimming.
    #[must_use]
    pub fn is_blank(code: &str) -> bool {
        code.trim().is_empty()
    }

    /// Concatenates captured output into newline-separated text.
    #[must_use]
    pub fn captured_text(&self) -> String {
        self.output
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
