//! One learner working through one lesson.
//!
//! [`LessonSession`] wires every stage together. A run flows through
//! execution, grading, the completion decision, an optional hint request and
//! the tutor's reaction. Execution, grading, the decision and the hint are
//! computed first; the run's state and its history entry are then updated in
//! a single synchronous step. A run abandoned before that step leaves the
//! session exactly as it was; one abandoned after it keeps a consistent run
//! record and is only missing the progress write or some tutor turns.
//!
//! Tutor turns are delivered one at a time: each waits out its own typing
//! delay, then is appended and broadcast.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::completion::{self, CompletionStatus};
use crate::config::{Config, TutorConfig};
use crate::error::Result;
use crate::events::{EventBroadcaster, SessionEvent, SessionSnapshot, SNAPSHOT_SCHEMA_VERSION};
use crate::grader::{self, CheckVerdict};
use crate::hints::{HintProvider, HintRequest, ModelHintProvider, NoHints};
use crate::lesson::Lesson;
use crate::model::{HttpModelClient, ModelClient};
use crate::output::ExecutionResult;
use crate::progress::{JsonFileProgressStore, ProgressStore};
use crate::runner::{CodeRunner, ExecutionRouter};
use crate::sandbox::Sandbox;
use crate::simulate::Simulator;
use crate::tutor::{self, ChatTurn, RunFeedback, Tutor, TutorPhase, TutorReply};

/// Shared handles every session uses.
#[derive(Clone)]
pub struct Engine {
    runner: Arc<dyn CodeRunner>,
    hints: Arc<dyn HintProvider>,
    progress: Arc<dyn ProgressStore>,
    pacing: TutorConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine from explicit handles.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CodeRunner>,
        hints: Arc<dyn HintProvider>,
        progress: Arc<dyn ProgressStore>,
        pacing: TutorConfig,
    ) -> Self {
        Self {
            runner,
            hints,
            progress,
            pacing,
        }
    }

    /// Builds the standard engine: HTTP model client, JSON file progress.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model: Arc<dyn ModelClient> = Arc::new(HttpModelClient::from_config(&config.model)?);
        let progress: Arc<dyn ProgressStore> =
            Arc::new(JsonFileProgressStore::new(&config.progress_file));
        Ok(Self::with_model(config, model, progress))
    }

    /// Builds the standard execution and hint paths around `model`.
    #[must_use]
    pub fn with_model(
        config: &Config,
        model: Arc<dyn ModelClient>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        let sandbox = Sandbox::new(config.sandbox.clone());
        let simulator = Simulator::new(
            Arc::clone(&model),
            config.simulation.clone(),
            config.model.timeout(),
        );
        let hints: Arc<dyn HintProvider> = if config.hints.enabled {
            Arc::new(ModelHintProvider::new(
                model,
                config.hints.clone(),
                config.model.timeout(),
            ))
        } else {
            Arc::new(NoHints)
        };

        Self::new(
            Arc::new(ExecutionRouter::new(sandbox, simulator)),
            hints,
            progress,
            config.tutor.clone(),
        )
    }

    /// Replaces the tutor pacing.
    #[must_use]
    pub fn with_pacing(mut self, pacing: TutorConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// The progress store sessions write to.
    #[must_use]
    pub fn progress(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Run number within the session (1-indexed).
    pub run: u32,
    /// Submitted code.
    pub code: String,
    /// Execution outcome.
    pub result: ExecutionResult,
    /// One verdict per lesson check.
    pub verdicts: Vec<CheckVerdict>,
    /// Completion status after the run.
    pub completion: CompletionStatus,
    /// This run completed the lesson for the first time.
    pub newly_completed: bool,
    /// Hint text, when one was requested and returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Tutor turns committed for this run.
    pub turns: Vec<ChatTurn>,
    /// Tutor phase after the run.
    pub phase: TutorPhase,
    /// Whether the progress store accepted the update.
    pub persisted: bool,
}

/// State of one learner on one lesson.
#[derive(Debug)]
pub struct LessonSession {
    id: String,
    user_id: String,
    lesson: Lesson,
    engine: Engine,
    tutor: Tutor,
    completion: CompletionStatus,
    runs: u32,
    version: u64,
    last_result: Option<ExecutionResult>,
    last_verdicts: Vec<CheckVerdict>,
    history: Vec<RunReport>,
    broadcaster: EventBroadcaster,
}

impl LessonSession {
    /// Opens a session: loads stored progress and greets the learner.
    pub async fn start(
        engine: Engine,
        id: impl Into<String>,
        user_id: impl Into<String>,
        lesson: Lesson,
    ) -> Self {
        let id = id.into();
        let user_id = user_id.into();

        let stored = match engine.progress.load_progress(&user_id, &lesson.id).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    lesson_id = %lesson.id,
                    error = %e,
                    "Could not load stored progress; starting fresh"
                );
                None
            }
        };
        let completion = CompletionStatus::from_progress(stored.as_ref());

        let mut session = Self {
            id,
            user_id,
            lesson,
            engine,
            tutor: Tutor::new(),
            completion,
            runs: 0,
            version: 0,
            last_result: None,
            last_verdicts: Vec::new(),
            history: Vec::new(),
            broadcaster: EventBroadcaster::default(),
        };

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            lesson_id = %session.lesson.id,
            completion = %completion,
            "Session started"
        );

        let reply = tutor::greeting(&session.lesson, &session.engine.pacing);
        session.deliver(reply).await;
        session
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Learner identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The lesson being worked on.
    #[must_use]
    pub const fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    /// Current tutor phase.
    #[must_use]
    pub const fn phase(&self) -> TutorPhase {
        self.tutor.phase()
    }

    /// Current completion status.
    #[must_use]
    pub const fn completion(&self) -> CompletionStatus {
        self.completion
    }

    /// Conversation so far.
    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        self.tutor.turns()
    }

    /// Reports of every committed run, oldest first.
    ///
    /// An entry is recorded as soon as the run commits; its `persisted` flag
    /// and tutor turns fill in as the later stages finish.
    #[must_use]
    pub fn history(&self) -> &[RunReport] {
        &self.history
    }

    /// Subscribes to this session's events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// Current observable state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            version: self.version,
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            lesson_id: self.lesson.id.clone(),
            lesson_title: self.lesson.title.clone(),
            phase: self.tutor.phase(),
            completion: self.completion,
            runs: self.runs,
            turns: self.tutor.turns().to_vec(),
            last_result: self.last_result.clone(),
            last_verdicts: self.last_verdicts.clone(),
        }
    }

    /// Handles a learner message and returns the turns it added: the
    /// learner's own turn first, then the tutor's.
    pub async fn send_message(&mut self, text: &str) -> Vec<ChatTurn> {
        let learner = self.tutor.record_learner(text, now_ms());
        self.version += 1;
        self.broadcaster
            .send(SessionEvent::tutor_turn(learner.clone(), self.tutor.phase()));

        let reply =
            tutor::react_to_message(self.tutor.phase(), text, &self.lesson, &self.engine.pacing);

        let mut turns = vec![learner];
        turns.extend(self.deliver(reply).await);
        turns
    }

    /// Runs `code` through every stage and returns what happened.
    pub async fn run(&mut self, code: &str) -> RunReport {
        let run = self.runs + 1;
        let language = self.lesson.language.clone();
        self.broadcaster
            .send(SessionEvent::run_started(run, language.as_str()));
        tracing::info!(session_id = %self.id, run, language = %language, "Run started");

        let result = self.engine.runner.execute(code, &language).await;
        let verdicts = grader::grade(code, &self.lesson.checks);
        let decision = completion::decide(self.completion, &result, &verdicts);

        let hint = match decision.hint.clone() {
            Some(reason) => {
                let request = HintRequest {
                    lesson_title: self.lesson.title.clone(),
                    description: self.lesson.description.clone(),
                    code: code.to_string(),
                    failing_checks: reason.into_lines(),
                    captured_output: result.captured_text(),
                };
                self.engine.hints.request_hint(&request).await
            }
            None => None,
        };

        let feedback = RunFeedback {
            passed: result.success && grader::all_passed(&verdicts),
            newly_completed: decision.newly_completed,
            fault: result.error.clone(),
            failing_checks: grader::failing_messages(&verdicts),
            origin: result.origin,
            hint: hint.clone(),
        };
        let reply = tutor::react_to_run(self.tutor.phase(), &feedback, &self.engine.pacing);

        // Commit the run. No suspension point until the history entry exists.
        let previous = self.completion;
        self.runs = run;
        self.completion = decision.status;
        self.last_result = Some(result.clone());
        self.last_verdicts = verdicts.clone();
        self.version += 1;

        self.broadcaster
            .send(SessionEvent::run_finished(run, result.clone()));
        self.broadcaster
            .send(SessionEvent::graded(run, verdicts.clone()));
        if previous != decision.status {
            self.broadcaster
                .send(SessionEvent::completion_changed(previous, decision.status));
        }

        let mut report = RunReport {
            run,
            code: code.to_string(),
            result,
            verdicts,
            completion: decision.status,
            newly_completed: decision.newly_completed,
            hint,
            turns: Vec::new(),
            phase: self.tutor.phase(),
            persisted: false,
        };
        self.history.push(report.clone());

        tracing::info!(
            session_id = %self.id,
            run,
            success = report.result.success,
            origin = ?report.result.origin,
            predicted = report.result.origin.is_prediction(),
            completion = %decision.status,
            duration_ms = report.result.duration_ms,
            "Run finished"
        );

        report.persisted = match self
            .engine
            .progress
            .save_progress(&self.user_id, &self.lesson.id, decision.persist_completed, code)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    lesson_id = %self.lesson.id,
                    error = %e,
                    "Failed to persist progress"
                );
                self.broadcaster
                    .send(SessionEvent::error(format!("Progress was not saved: {e}")));
                false
            }
        };
        self.record(&report);

        report.turns = self.deliver(reply).await;
        report.phase = self.tutor.phase();
        self.record(&report);
        report
    }

    /// Overwrites the newest history entry with `report`.
    fn record(&mut self, report: &RunReport) {
        if let Some(entry) = self.history.last_mut() {
            entry.clone_from(report);
        }
    }

    /// Waits out each planned turn's delay, then appends and broadcasts it.
    ///
    /// The phase changes when the first turn appears.
    async fn deliver(&mut self, reply: TutorReply) -> Vec<ChatTurn> {
        let TutorReply { phase, turns: planned } = reply;
        if planned.is_empty() {
            self.tutor.advance(phase);
            self.version += 1;
            return Vec::new();
        }

        let mut turns = Vec::with_capacity(planned.len());
        for planned in planned {
            if !planned.delay.is_zero() {
                tokio::time::sleep(planned.delay).await;
            }
            self.tutor.advance(phase);
            let turn = self.tutor.append(planned, now_ms());
            self.version += 1;
            self.broadcaster
                .send(SessionEvent::tutor_turn(turn.clone(), self.tutor.phase()));
            turns.push(turn);
        }
        turns
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
