//! JSON rendering of session reports.
//!
//! # Example
//!
//! ```rust
//! use lessonloop_report::{Report, json::JsonGenerator};
//!
//! let report = Report::builder()
//!     .lesson("variables", "Variables", "javascript")
//!     .user_id("ada")
//!     .build()
//!     .unwrap();
//!
//! let compact = JsonGenerator::new(&report).generate().unwrap();
//! assert!(!compact.contains('\n'));
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::{Report, Result};

/// Serializes a [`Report`] to JSON.
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Single-line JSON.
    pub fn generate(&self) -> Result<String> {
        Ok(serde_json::to_string(self.report)?)
    }

    /// Indented JSON.
    pub fn generate_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.report)?)
    }

    /// Writes the report to `path`, creating or truncating the file.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReportError::Io`] if the file cannot be written and
    /// [`crate::ReportError::Serialization`] if serialization fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self.report)?;
        } else {
            serde_json::to_writer(&mut writer, self.report)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
