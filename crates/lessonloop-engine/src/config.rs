//! Configuration types for the LessonLoop engine.
//!
//! This module provides all configuration structures used to control the
//! engine: sandbox bounds, the model endpoint used for simulated execution
//! and hints, tutor pacing, and where lessons and progress live.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "lessonloop.json";

/// Default directory scanned for lesson files.
fn default_lessons_dir() -> String {
    "lessons".to_string()
}

/// Default progress file path.
fn default_progress_file() -> String {
    ".lessonloop/progress.json".to_string()
}

/// Default wall-clock bound for one sandboxed run.
const fn default_sandbox_timeout_ms() -> u64 {
    5_000
}

/// Default number of loop iterations before the interpreter aborts.
const fn default_loop_iteration_limit() -> u64 {
    10_000_000
}

/// Default maximum call depth inside the interpreter.
const fn default_recursion_limit() -> usize {
    400
}

/// Default cap on captured output entries per run.
const fn default_max_output_entries() -> usize {
    1_000
}

/// Default model name.
fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

/// Default environment variable holding the model API key.
fn default_api_key_env() -> String {
    "LESSONLOOP_API_KEY".to_string()
}

/// Default model call timeout in seconds.
const fn default_model_timeout() -> u64 {
    30
}

/// Default sampling temperature for simulated execution.
const fn default_simulation_temperature() -> f32 {
    0.1
}

/// Default cap on predicted output lines.
const fn default_max_output_lines() -> usize {
    500
}

/// Default cap on the length of one predicted output line.
const fn default_max_line_length() -> usize {
    2_000
}

/// Default typing delay before a tutor turn.
const fn default_typing_delay_ms() -> u64 {
    1_000
}

/// Default pause before a follow-up tutor turn.
const fn default_follow_up_delay_ms() -> u64 {
    1_500
}

/// Default sampling temperature for hints.
const fn default_hint_temperature() -> f32 {
    0.7
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for the LessonLoop engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory containing lesson JSON files.
    #[serde(default = "default_lessons_dir")]
    pub lessons_dir: String,

    /// Path of the JSON progress store.
    #[serde(default = "default_progress_file")]
    pub progress_file: String,

    /// Bounds for the in-process sandbox.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Model endpoint used for simulation and hints.
    #[serde(default)]
    pub model: ModelConfig,

    /// Simulated execution settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Tutor pacing.
    #[serde(default)]
    pub tutor: TutorConfig,

    /// Hint generation settings.
    #[serde(default)]
    pub hints: HintConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lessons_dir: default_lessons_dir(),
            progress_file: default_progress_file(),
            sandbox: SandboxConfig::default(),
            model: ModelConfig::default(),
            simulation: SimulationConfig::default(),
            tutor: TutorConfig::default(),
            hints: HintConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `lessonloop.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EngineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `lessonloop.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `EngineError::ConfigValidationError` if the configuration values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EngineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_ms == 0 {
            return Err(EngineError::config_validation(
                "sandbox.timeoutMs must be greater than 0",
                "Set sandbox.timeoutMs to at least 1 in your lessonloop.json",
            ));
        }

        if self.sandbox.loop_iteration_limit == 0 {
            return Err(EngineError::config_validation(
                "sandbox.loopIterationLimit must be greater than 0",
                "Set sandbox.loopIterationLimit to a positive number in your lessonloop.json",
            ));
        }

        if self.sandbox.max_output_entries == 0 {
            return Err(EngineError::config_validation(
                "sandbox.maxOutputEntries must be greater than 0",
                "Set sandbox.maxOutputEntries to at least 1 in your lessonloop.json",
            ));
        }

        if self.model.timeout_seconds == 0 {
            return Err(EngineError::config_validation(
                "model.timeoutSeconds must be greater than 0",
                "Set model.timeoutSeconds to at least 1 in your lessonloop.json",
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(EngineError::config_validation(
                "model.model must not be empty",
                "Name the model to call, e.g. \"gpt-4o-mini\"",
            ));
        }

        if !(0.0..=2.0).contains(&self.simulation.temperature)
            || !(0.0..=2.0).contains(&self.hints.temperature)
        {
            return Err(EngineError::config_validation(
                "temperatures must be between 0.0 and 2.0",
                "Keep simulation.temperature low (e.g. 0.1) for repeatable predictions",
            ));
        }

        if self.simulation.max_output_lines == 0 || self.simulation.max_line_length == 0 {
            return Err(EngineError::config_validation(
                "simulation.maxOutputLines and simulation.maxLineLength must be greater than 0",
                "Use the defaults (500 lines, 2000 characters) unless you need tighter bounds",
            ));
        }

        if self.lessons_dir.trim().is_empty() {
            return Err(EngineError::config_validation(
                "lessonsDir must not be empty",
                "Provide a lessons directory in your lessonloop.json (use '.' for current directory)",
            ));
        }

        if self.progress_file.trim().is_empty() {
            return Err(EngineError::config_validation(
                "progressFile must not be empty",
                "Provide a progress file path in your lessonloop.json",
            ));
        }

        Ok(())
    }
}

/// Bounds applied to every sandboxed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Wall-clock bound in milliseconds.
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,

    /// Loop iterations allowed before the interpreter aborts the program.
    #[serde(default = "default_loop_iteration_limit")]
    pub loop_iteration_limit: u64,

    /// Maximum call depth.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// Output entries kept per run.
    #[serde(default = "default_max_output_entries")]
    pub max_output_entries: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout_ms(),
            loop_iteration_limit: default_loop_iteration_limit(),
            recursion_limit: default_recursion_limit(),
            max_output_entries: default_max_output_entries(),
        }
    }
}

impl SandboxConfig {
    /// Wall-clock bound as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Supported model providers. All speak the OpenAI-compatible chat API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModelProvider {
    /// OpenAI (default).
    #[default]
    OpenAi,
    /// Groq.
    Groq,
    /// A local Ollama server.
    Ollama,
}

impl ModelProvider {
    /// Parses a string into a `ModelProvider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "groq" => Some(Self::Groq),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Base URL used when `model.baseUrl` is not set.
    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Returns `true` if requests must carry an API key.
    #[must_use]
    pub const fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl<'de> Deserialize<'de> for ModelProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid model provider '{s}': expected one of 'openai', 'groq', 'ollama'"
            ))
        })
    }
}

impl Serialize for ModelProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::Ollama => "ollama",
        };
        serializer.serialize_str(s)
    }
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Which provider to talk to.
    #[serde(default)]
    pub provider: ModelProvider,

    /// Overrides the provider's default base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model name sent with each request.
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            base_url: None,
            model: default_model_name(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

impl ModelConfig {
    /// The base URL requests are sent to.
    #[must_use]
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Simulated execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Sampling temperature; kept low so repeated runs agree.
    #[serde(default = "default_simulation_temperature")]
    pub temperature: f32,

    /// Predicted output lines kept.
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,

    /// Characters kept per predicted line.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            temperature: default_simulation_temperature(),
            max_output_lines: default_max_output_lines(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Tutor pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorConfig {
    /// Typing delay before a tutor turn, in milliseconds.
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,

    /// Pause before a follow-up turn, in milliseconds.
    #[serde(default = "default_follow_up_delay_ms")]
    pub follow_up_delay_ms: u64,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            typing_delay_ms: default_typing_delay_ms(),
            follow_up_delay_ms: default_follow_up_delay_ms(),
        }
    }
}

impl TutorConfig {
    /// Pacing with every delay set to zero.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            typing_delay_ms: 0,
            follow_up_delay_ms: 0,
        }
    }

    /// Typing delay as a `Duration`.
    #[must_use]
    pub const fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    /// Follow-up delay as a `Duration`.
    #[must_use]
    pub const fn follow_up_delay(&self) -> Duration {
        Duration::from_millis(self.follow_up_delay_ms)
    }
}

/// Hint generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintConfig {
    /// Whether failed runs ask the model for a hint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling temperature for hint text.
    #[serde(default = "default_hint_temperature")]
    pub temperature: f32,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            temperature: default_hint_temperature(),
        }
    }
}
