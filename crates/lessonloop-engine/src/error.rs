//! Error types for the LessonLoop engine.
//!
//! This module defines the error hierarchy for engine operations that can
//! fail outside of learner code: configuration loading, lesson loading, model
//! calls, progress persistence, and session lookup. Learner code faults are
//! never errors; they travel inside [`crate::ExecutionResult`].

use std::path::PathBuf;

/// A specialized `Result` type for LessonLoop engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur inside the LessonLoop engine.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help operators resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lessonloop.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Loading Errors
    // ========================================================================
    /// Lesson file was not found at the specified path.
    #[error("Lesson not found: '{path}'\n\nSuggestion: Check the lesson path or the 'lessonsDir' field in lessonloop.json")]
    LessonNotFound {
        /// Path where the lesson was expected.
        path: PathBuf,
    },

    /// Lesson file exceeds the size limit.
    #[error("Lesson exceeds size limit (256KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the lesson or move long prose out of the content field")]
    LessonTooLarge {
        /// Path to the oversized lesson.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Lesson file contains non-UTF-8 content.
    #[error("Lesson has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    LessonEncodingError {
        /// Path to the lesson with encoding issues.
        path: PathBuf,
    },

    /// Lesson file is not a valid lesson document.
    #[error("Invalid lesson '{path}': {message}\n\nSuggestion: Lessons need title, description, content, language and checks fields")]
    LessonParseError {
        /// Path to the lesson file.
        path: PathBuf,
        /// Description of the parse or validation failure.
        message: String,
    },

    /// No lesson with the requested id is known.
    #[error("Unknown lesson id '{id}'\n\nSuggestion: List available lessons with GET /api/lessons")]
    UnknownLesson {
        /// The requested lesson id.
        id: String,
    },

    // ========================================================================
    // Model Errors
    // ========================================================================
    /// Model API returned an error (authentication, rate limiting, etc.).
    #[error("Model API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    ModelApiError {
        /// The kind of API error.
        kind: ModelErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The model did not answer within the configured timeout.
    #[error("Model call timed out after {timeout_secs}s\n\nSuggestion: Raise model.timeoutSeconds or check the provider's status")]
    ModelTimeout {
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    /// The model answered, but not with the expected shape.
    #[error("Malformed model response: {message}")]
    ModelResponseError {
        /// Description of the contract violation.
        message: String,
    },

    // ========================================================================
    // Progress Persistence Errors
    // ========================================================================
    /// Failed to write the progress store.
    #[error("Failed to write progress to '{path}': {message}\n\nSuggestion: Check write permissions and available disk space")]
    ProgressWriteError {
        /// Path where progress was to be written.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },

    /// Progress file contains malformed JSON that cannot be recovered.
    #[error("Corrupted progress file '{path}': {message}\n\nSuggestion: Remove the progress file to start fresh, or restore from backup")]
    ProgressFileCorrupted {
        /// Path to the corrupted progress file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No session with the requested id exists.
    #[error("Session not found: '{id}'")]
    SessionNotFound {
        /// The requested session id.
        id: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of model API errors for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Authentication failure (missing or invalid API key).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ModelErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Set the API key environment variable named by model.apiKeyEnv",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the model provider may be experiencing issues",
            Self::Network => "Check your network connection and model.baseUrl",
            Self::Other => "Check the model provider's status page",
        }
    }

    /// Classifies an HTTP status code returned by a model provider.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl EngineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub fn lesson_not_found(path: impl Into<PathBuf>) -> Self {
        Self::LessonNotFound { path: path.into() }
    }

    /// Creates a new `LessonTooLarge` error.
    #[must_use]
    pub fn lesson_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::LessonTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `LessonEncodingError`.
    #[must_use]
    pub fn lesson_encoding(path: impl Into<PathBuf>) -> Self {
        Self::LessonEncodingError { path: path.into() }
    }

    /// Creates a new `LessonParseError`.
    #[must_use]
    pub fn lesson_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LessonParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownLesson` error.
    #[must_use]
    pub fn unknown_lesson(id: impl Into<String>) -> Self {
        Self::UnknownLesson { id: id.into() }
    }

    /// Creates a new `ModelApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn model_api(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::ModelApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `ModelTimeout` error.
    #[must_use]
    pub const fn model_timeout(timeout_secs: u64) -> Self {
        Self::ModelTimeout { timeout_secs }
    }

    /// Creates a new `ModelResponseError`.
    #[must_use]
    pub fn model_response(message: impl Into<String>) -> Self {
        Self::ModelResponseError {
            message: message.into(),
        }
    }

    /// Creates a new `ProgressWriteError`.
    #[must_use]
    pub fn progress_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProgressWriteError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ProgressFileCorrupted` error.
    #[must_use]
    pub fn progress_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProgressFileCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ModelApiError {
                kind: ModelErrorKind::RateLimit | ModelErrorKind::Server | ModelErrorKind::Network,
                ..
            } | Self::ModelTimeout { .. }
                | Self::ProgressWriteError { .. }
        )
    }

    /// Returns `true` if this error prevents the engine from starting.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::LessonNotFound { .. }
                | Self::LessonTooLarge { .. }
                | Self::LessonEncodingError { .. }
                | Self::LessonParseError { .. }
                | Self::ProgressFileCorrupted { .. }
        )
    }
}
