//! Markdown rendering of session reports.
//!
//! The document has a summary table, one section per run (output, error,
//! checks, hint) and the tutor transcript.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{Report, RunOrigin, RunRecord, TranscriptTurn};

/// Longest output line kept in the rendered output block.
const MAX_OUTPUT_LINE_LENGTH: usize = 200;

/// Renders a [`Report`] as Markdown.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Renders the whole document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_runs(&mut output);
        self.write_transcript(&mut output);
        self.write_footer(&mut output);

        output
    }

    /// Renders the document and writes it to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# LessonLoop Session Report: {}\n",
            escape_markdown(&self.report.lesson.title)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let lesson = &self.report.lesson;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", summary.status.description());
        let _ = writeln!(output, "| Learner | {} |", escape_markdown(&self.report.user_id));
        let _ = writeln!(
            output,
            "| Lesson | {} ({}) |",
            escape_markdown(&lesson.title),
            escape_markdown(&lesson.id)
        );
        let _ = writeln!(output, "| Language | {} |", escape_markdown(&lesson.language));
        if !summary.phase.is_empty() {
            let _ = writeln!(output, "| Tutor Phase | {} |", escape_markdown(&summary.phase));
        }
        let _ = writeln!(
            output,
            "| Runs | {} ({} passing) |",
            summary.run_count, summary.passing_runs
        );
        if let Some(run) = summary.completed_on_run {
            let _ = writeln!(output, "| Completed On | Run #{run} |");
        }
        let _ = writeln!(output);

        if self.report.has_predicted_runs() {
            let _ = writeln!(
                output,
                "> Some results were predicted by a model, not executed.\n"
            );
        }
    }

    fn write_runs(&self, output: &mut String) {
        let _ = writeln!(output, "## Runs\n");

        if self.report.runs.is_empty() {
            let _ = writeln!(output, "*No code was run.*\n");
            return;
        }

        for run in &self.report.runs {
            write_run(output, run);
        }
    }

    fn write_transcript(&self, output: &mut String) {
        let _ = writeln!(output, "## Tutor Transcript\n");

        if self.report.transcript.is_empty() {
            let _ = writeln!(output, "*No conversation recorded.*\n");
            return;
        }

        for turn in &self.report.transcript {
            write_turn(output, turn);
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by LessonLoop at {timestamp}*");
    }
}

// ============================================================================
// Sections
// ============================================================================

fn write_run(output: &mut String, run: &RunRecord) {
    let verdict = if run.passed() { "&#9989; Passed" } else { "&#10060; Failed" };
    let _ = writeln!(output, "### Run #{}: {verdict}\n", run.number);

    let origin = match run.origin {
        RunOrigin::Native => String::from("executed"),
        other => format!("**{}**", other.label()),
    };
    let _ = writeln!(
        output,
        "*{origin} in {}*\n",
        format_duration_ms(run.duration_ms)
    );

    if run.output.is_empty() {
        let _ = writeln!(output, "*No output.*\n");
    } else {
        let lines: Vec<String> = run
            .output
            .iter()
            .map(|line| {
                let content = truncate_line(&line.content, MAX_OUTPUT_LINE_LENGTH);
                if line.kind == "log" {
                    content
                } else {
                    format!("[{}] {content}", line.kind)
                }
            })
            .collect();
        write_code_block(output, &lines.join("\n"));
    }

    if let Some(error) = &run.error {
        let _ = writeln!(output, "**Error**: {}\n", escape_markdown(error));
    }

    if !run.checks.is_empty() {
        let _ = writeln!(
            output,
            "**Checks** ({}/{} passed):\n",
            run.passed_checks(),
            run.checks.len()
        );
        for check in &run.checks {
            let mark = if check.passed { "x" } else { " " };
            let _ = writeln!(output, "- [{mark}] {}", escape_markdown(&check.message));
        }
        let _ = writeln!(output);
    }

    if let Some(hint) = &run.hint {
        let _ = writeln!(output, "**Hint**: {}\n", escape_markdown(hint));
    }
}

/// Tutor text is itself Markdown, so it is quoted rather than escaped.
fn write_turn(output: &mut String, turn: &TranscriptTurn) {
    let marker = match turn.style.as_str() {
        "success" => " &#127881;",
        "error" => " &#9888;&#65039;",
        _ => "",
    };
    let _ = writeln!(output, "**{}**{marker}:\n", turn.speaker);
    for line in turn.text.lines() {
        if line.is_empty() {
            let _ = writeln!(output, ">");
        } else {
            let _ = writeln!(output, "> {line}");
        }
    }
    let _ = writeln!(output);
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes a fenced block whose fence is longer than any backtick run inside.
fn write_code_block(output: &mut String, content: &str) {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    let _ = writeln!(output, "{fence}text\n{content}\n{fence}\n");
}

/// Formats milliseconds: below one second as `"12ms"`, above as `"1.50s"`.
fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{}.{:02}s", ms / 1000, (ms % 1000) / 10)
    }
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters Markdown would interpret, and flattens newlines.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

/// Cuts a line to `max` characters, adding an ellipsis when cut.
fn truncate_line(line: &str, max: usize) -> String {
    match line.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
