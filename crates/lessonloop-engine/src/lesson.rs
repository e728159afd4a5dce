//! Lesson loading and the lesson catalog.
//!
//! A lesson is a JSON document with a title, a description, the full problem
//! statement, the language learners write in, and the checks used to grade
//! submissions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Maximum allowed lesson file size in bytes (256KB).
pub const MAX_LESSON_SIZE: u64 = 256 * 1024;

/// Wire tag for source-pattern checks.
pub const SOURCE_PATTERN_KIND: &str = "source-pattern";

/// A single grading rule bound to a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCheck", into = "RawCheck")]
pub enum LessonCheck {
    /// Regex predicate over the learner's raw source text.
    SourcePattern {
        /// Regular expression, evaluated in multiline mode.
        pattern: String,
        /// Message shown to the learner for this check.
        message: String,
    },
    /// A check kind this engine does not know how to evaluate.
    Unrecognized {
        /// The kind as it appeared in the lesson file.
        kind: String,
        /// Message declared with the check, if any.
        message: String,
    },
}

impl LessonCheck {
    /// Builds a source-pattern check.
    #[must_use]
    pub fn source_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourcePattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// The message declared with the check.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::SourcePattern { message, .. } | Self::Unrecognized { message, .. } => message,
        }
    }

    /// The wire kind of the check.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::SourcePattern { .. } => SOURCE_PATTERN_KIND,
            Self::Unrecognized { kind, .. } => kind,
        }
    }
}

/// On-disk shape of a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCheck {
    #[serde(alias = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default)]
    message: String,
}

impl TryFrom<RawCheck> for LessonCheck {
    type Error = String;

    fn try_from(raw: RawCheck) -> std::result::Result<Self, Self::Error> {
        if raw.kind == SOURCE_PATTERN_KIND {
            let pattern = raw
                .pattern
                .ok_or_else(|| "source-pattern check is missing 'pattern'".to_string())?;
            Ok(Self::SourcePattern {
                pattern,
                message: raw.message,
            })
        } else {
            Ok(Self::Unrecognized {
                kind: raw.kind,
                message: raw.message,
            })
        }
    }
}

impl From<LessonCheck> for RawCheck {
    fn from(check: LessonCheck) -> Self {
        match check {
            LessonCheck::SourcePattern { pattern, message } => Self {
                kind: SOURCE_PATTERN_KIND.to_string(),
                pattern: Some(pattern),
                message,
            },
            LessonCheck::Unrecognized { kind, message } => Self {
                kind,
                pattern: None,
                message,
            },
        }
    }
}

/// A lesson as loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Stable identifier; defaults to the file stem.
    #[serde(default)]
    pub id: String,

    /// Short title.
    pub title: String,

    /// One-paragraph summary.
    #[serde(default)]
    pub description: String,

    /// Full problem statement in markdown.
    #[serde(default)]
    pub content: String,

    /// Language learners write in (e.g. "javascript", "python").
    pub language: String,

    /// Grading rules, evaluated in order.
    #[serde(default)]
    pub checks: Vec<LessonCheck>,
}

impl Lesson {
    /// Loads a lesson from a JSON file.
    ///
    /// Validates that:
    /// - The file exists
    /// - The file size is within the 256KB limit
    /// - The content is valid UTF-8 and well-formed lesson JSON
    ///
    /// # Errors
    ///
    /// Returns `EngineError::LessonNotFound` if the file doesn't exist.
    /// Returns `EngineError::LessonTooLarge` if the file exceeds 256KB.
    /// Returns `EngineError::LessonEncodingError` if the file is not valid UTF-8.
    /// Returns `EngineError::LessonParseError` if the JSON is malformed or the
    /// lesson fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::lesson_not_found(path)
            } else {
                EngineError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_LESSON_SIZE {
            return Err(EngineError::lesson_too_large(path, file_size / 1024));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                EngineError::lesson_encoding(path)
            } else {
                EngineError::Io(e)
            }
        })?;

        let mut lesson: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::lesson_parse(path, e.to_string()))?;

        if lesson.id.trim().is_empty() {
            lesson.id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        lesson
            .validate()
            .map_err(|message| EngineError::lesson_parse(path, message))?;

        Ok(lesson)
    }

    /// Checks the fields a session cannot do without.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("lesson id must not be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("lesson title must not be empty".to_string());
        }
        if self.language.trim().is_empty() {
            return Err("lesson language must not be empty".to_string());
        }
        Ok(())
    }

    /// The full statement the tutor reveals when the problem phase begins.
    #[must_use]
    pub fn statement(&self) -> String {
        let mut statement = format!("## {}", self.title);
        for part in [&self.description, &self.content] {
            if !part.trim().is_empty() {
                statement.push_str("\n\n");
                statement.push_str(part.trim());
            }
        }
        statement
    }
}

/// Short listing entry for a lesson.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    /// Lesson id.
    pub id: String,
    /// Lesson title.
    pub title: String,
    /// Lesson description.
    pub description: String,
    /// Lesson language.
    pub language: String,
    /// Number of checks.
    pub check_count: usize,
}

/// Lessons indexed by id.
#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    lessons: BTreeMap<String, Lesson>,
}

impl LessonCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` file in `dir` as a lesson.
    ///
    /// Files that fail to load are skipped with a warning so one broken
    /// lesson does not take the whole catalog down.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::LessonNotFound` if the directory doesn't exist.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::lesson_not_found(dir)
            } else {
                EngineError::Io(e)
            }
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .collect();
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            match Lesson::load(&path) {
                Ok(lesson) => {
                    tracing::debug!(lesson_id = %lesson.id, path = %path.display(), "Loaded lesson");
                    catalog.insert(lesson);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping lesson file");
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = catalog.len(), "Lesson catalog loaded");
        Ok(catalog)
    }

    /// Adds or replaces a lesson.
    pub fn insert(&mut self, lesson: Lesson) {
        self.lessons.insert(lesson.id.clone(), lesson);
    }

    /// Looks up a lesson by id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownLesson` if no lesson has this id.
    pub fn get(&self, id: &str) -> Result<&Lesson> {
        self.lessons
            .get(id)
            .ok_or_else(|| EngineError::unknown_lesson(id))
    }

    /// Summaries of all lessons, ordered by id.
    #[must_use]
    pub fn summaries(&self) -> Vec<LessonSummary> {
        self.lessons
            .values()
            .map(|lesson| LessonSummary {
                id: lesson.id.clone(),
                title: lesson.title.clone(),
                description: lesson.description.clone(),
                language: lesson.language.clone(),
                check_count: lesson.checks.len(),
            })
            .collect()
    }

    /// Number of lessons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    /// Returns `true` if the catalog holds no lessons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

impl FromIterator<Lesson> for LessonCatalog {
    fn from_iter<T: IntoIterator<Item = Lesson>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for lesson in iter {
            catalog.insert(lesson);
        }
        catalog
    }
}
