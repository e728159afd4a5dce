//! Session events and snapshots for presentation layers.
//!
//! A session publishes a [`SessionEvent`] after each stage of a run and for
//! every committed tutor turn. Observers that join late get the full picture
//! from a [`SessionSnapshot`], sent as the payload of the `connected` event.
//!
//! # Event Types
//!
//! - `connected` - Sent when an observer subscribes, includes the snapshot
//! - `run_started` - A run has been accepted
//! - `run_finished` - Execution finished (sandbox or simulated)
//! - `graded` - Checks were evaluated
//! - `completion_changed` - Completion status moved
//! - `tutor_turn` - A turn was added to the conversation
//! - `error` - Something went wrong outside the learner's program
//!
//! # Example
//!
//! ```
//! use lessonloop_engine::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::run_started(1, "javascript"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "run_started");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::completion::CompletionStatus;
use crate::grader::CheckVerdict;
use crate::output::ExecutionResult;
use crate::tutor::{ChatTurn, TutorPhase};

/// Version of the snapshot layout. Bumped on incompatible changes.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Snapshot
// ============================================================================

/// Complete observable state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Layout version, always [`SNAPSHOT_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Incremented on every committed change to the session.
    pub version: u64,
    /// Session identifier.
    pub session_id: String,
    /// Learner identifier.
    pub user_id: String,
    /// Lesson identifier.
    pub lesson_id: String,
    /// Lesson title.
    pub lesson_title: String,
    /// Tutor phase.
    pub phase: TutorPhase,
    /// Completion status.
    pub completion: CompletionStatus,
    /// Runs committed so far.
    pub runs: u32,
    /// Conversation so far.
    pub turns: Vec<ChatTurn>,
    /// Result of the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ExecutionResult>,
    /// Verdicts of the most recent run.
    #[serde(default)]
    pub last_verdicts: Vec<CheckVerdict>,
}

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it is right now.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `run_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    /// Run number within the session (1-indexed).
    pub run: u32,
    /// Language of the submission.
    pub language: String,
    /// When the run was accepted.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `run_finished` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFinishedPayload {
    /// Run number.
    pub run: u32,
    /// What the run produced.
    pub result: ExecutionResult,
}

/// Payload for the `graded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedPayload {
    /// Run number.
    pub run: u32,
    /// One verdict per lesson check, in check order.
    pub verdicts: Vec<CheckVerdict>,
}

/// Payload for the `completion_changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChangedPayload {
    /// Status before the run.
    pub from: CompletionStatus,
    /// Status after the run.
    pub to: CompletionStatus,
}

/// Payload for the `tutor_turn` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorTurnPayload {
    /// The committed turn.
    pub turn: ChatTurn,
    /// Tutor phase after the turn was committed.
    pub phase: TutorPhase,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published by a session.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when an observer subscribes.
    Connected(ConnectedPayload),
    /// Sent when a run is accepted.
    RunStarted(RunStartedPayload),
    /// Sent when execution finishes.
    RunFinished(RunFinishedPayload),
    /// Sent when checks have been evaluated.
    Graded(GradedPayload),
    /// Sent when the completion status changes.
    CompletionChanged(CompletionChangedPayload),
    /// Sent for every committed conversation turn.
    TutorTurn(TutorTurnPayload),
    /// Sent when an error occurs outside the learner's program.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `RunStarted` event stamped with the current time.
    #[must_use]
    pub fn run_started(run: u32, language: impl Into<String>) -> Self {
        Self::RunStarted(RunStartedPayload {
            run,
            language: language.into(),
            timestamp: Utc::now(),
        })
    }

    /// Creates a `RunFinished` event.
    #[must_use]
    pub const fn run_finished(run: u32, result: ExecutionResult) -> Self {
        Self::RunFinished(RunFinishedPayload { run, result })
    }

    /// Creates a `Graded` event.
    #[must_use]
    pub const fn graded(run: u32, verdicts: Vec<CheckVerdict>) -> Self {
        Self::Graded(GradedPayload { run, verdicts })
    }

    /// Creates a `CompletionChanged` event.
    #[must_use]
    pub const fn completion_changed(from: CompletionStatus, to: CompletionStatus) -> Self {
        Self::CompletionChanged(CompletionChangedPayload { from, to })
    }

    /// Creates a `TutorTurn` event.
    #[must_use]
    pub const fn tutor_turn(turn: ChatTurn, phase: TutorPhase) -> Self {
        Self::TutorTurn(TutorTurnPayload { turn, phase })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::RunStarted(_) => "run_started",
            Self::RunFinished(_) => "run_finished",
            Self::Graded(_) => "graded",
            Self::CompletionChanged(_) => "completion_changed",
            Self::TutorTurn(_) => "tutor_turn",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans session events out to every subscriber.
///
/// Events are not kept for observers that subscribe later; those start from
/// a snapshot instead.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind gets a `Lagged` error and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns how many subscribers will see it.
    pub fn send(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// Tests
// ============================================================================
