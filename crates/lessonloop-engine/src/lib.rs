//! LessonLoop Engine
//!
//! Runs learner code for interactive programming lessons, grades it against
//! lesson checks, tracks completion, and drives the tutor conversation.
//! JavaScript runs natively in an embedded sandbox; other languages get a
//! model-predicted result clearly marked as such.

pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod events;
pub mod grader;
pub mod hints;
pub mod lesson;
pub mod model;
pub mod output;
pub mod progress;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod simulate;
pub mod tutor;
mod websocket;

pub use api::{
    create_router, AppState, CreateSessionRequest, ErrorResponse, MessageRequest,
    MessageResponse, RunRequest,
};
pub use completion::{decide, CompletionDecision, CompletionStatus, HintReason};
pub use config::{
    Config, HintConfig, ModelConfig, ModelProvider, SandboxConfig, SimulationConfig, TutorConfig,
};
pub use error::{EngineError, ModelErrorKind, Result};
pub use events::{EventBroadcaster, SessionEvent, SessionSnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use grader::{grade, CheckVerdict};
pub use hints::{HintProvider, HintRequest, ModelHintProvider, NoHints};
pub use lesson::{Lesson, LessonCatalog, LessonCheck, LessonSummary, MAX_LESSON_SIZE};
pub use model::{HttpModelClient, ModelClient, ModelRequest};
pub use output::{ExecutionResult, OutputEntry, OutputKind, OutputLog, ResultOrigin};
pub use progress::{InMemoryProgressStore, JsonFileProgressStore, LessonProgress, ProgressStore};
pub use runner::{CodeRunner, ExecutionRouter};
pub use sandbox::Sandbox;
pub use session::{Engine, LessonSession, RunReport};
pub use simulate::Simulator;
pub use tutor::{ChatTurn, Speaker, TurnKind, Tutor, TutorPhase};
