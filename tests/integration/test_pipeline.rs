//! End-to-end tests of the run pipeline: execution, grading, completion,
//! hints and the tutor conversation, wired together by `LessonSession`.

mod common;

use std::sync::Arc;

use common::{sample_catalog, scratch_dir, test_engine, ScriptedModel};
use lessonloop_engine::{
    CompletionStatus, Config, Engine, InMemoryProgressStore, JsonFileProgressStore,
    LessonSession, ProgressStore, ResultOrigin, SessionEvent, TurnKind, TutorConfig, TutorPhase,
};

async fn start(engine: Engine, lesson_id: &str) -> LessonSession {
    let lesson = sample_catalog().get(lesson_id).unwrap().clone();
    LessonSession::start(engine, "session-1", "ada", lesson).await
}

// ============================================================================
// Lessons
// ============================================================================

#[test]
fn test_sample_lessons_load() {
    let catalog = sample_catalog();

    assert_eq!(catalog.len(), 3);
    let variables = catalog.get("variables").unwrap();
    assert_eq!(variables.language, "javascript");
    assert_eq!(variables.checks.len(), 2);
    assert_eq!(catalog.get("python-greeting").unwrap().language, "python");
    assert!(catalog.get("missing").is_err());
}

// ============================================================================
// Conversation pacing
// ============================================================================

#[tokio::test]
async fn test_tutor_turns_are_spaced_by_typing_delay() {
    let engine = test_engine(
        Arc::new(ScriptedModel::default()),
        Arc::new(InMemoryProgressStore::new()),
    )
    .with_pacing(TutorConfig {
        typing_delay_ms: 200,
        follow_up_delay_ms: 300,
    });
    let mut session = start(engine, "variables").await;

    let turns = session.send_message("ready").await;
    assert_eq!(turns.len(), 3);
    assert!(turns[1].created_at_ms - turns[0].created_at_ms >= 195);
    assert!(turns[2].created_at_ms - turns[1].created_at_ms >= 295);

    let report = session.run("let x = 5;\nconsole.log(x);").await;
    assert_eq!(report.turns.len(), 2);
    assert!(report.turns[1].created_at_ms - report.turns[0].created_at_ms >= 295);
}

// ============================================================================
// Native execution
// ============================================================================

#[tokio::test]
async fn test_javascript_lesson_end_to_end() {
    let model = Arc::new(ScriptedModel::new(&["Try declaring x with let instead of const."]));
    let store = Arc::new(InMemoryProgressStore::new());
    let mut session = start(test_engine(Arc::clone(&model), store.clone()), "variables").await;

    assert_eq!(session.phase(), TutorPhase::Intro);
    assert_eq!(session.turns().len(), 1);
    assert!(session.turns()[0].text.contains("Variables"));

    let turns = session.send_message("I'm ready!").await;
    assert_eq!(session.phase(), TutorPhase::Problem);
    assert!(turns[1]
        .text
        .contains("Store a value in a variable declared with let"));

    // Runs, but uses const.
    let first = session.run("const x = 5;\nconsole.log(x);").await;
    assert!(first.result.success);
    assert_eq!(first.result.origin, ResultOrigin::Native);
    assert_eq!(first.result.output[0].content, "5");
    assert!(!first.verdicts[0].passed);
    assert!(first.verdicts[1].passed);
    assert_eq!(first.completion, CompletionStatus::Attempted);
    assert_eq!(
        first.hint.as_deref(),
        Some("Try declaring x with let instead of const.")
    );
    assert!(first.turns[0].text.contains("- Declare x using let"));
    assert!(first.turns.last().unwrap().text.starts_with("Hint: "));
    assert_eq!(first.phase, TutorPhase::Problem);
    assert!(first.persisted);

    let second = session.run("let x = 5;\nconsole.log(x);").await;
    assert!(second.verdicts.iter().all(|v| v.passed));
    assert_eq!(second.completion, CompletionStatus::Completed);
    assert!(second.newly_completed);
    assert_eq!(second.phase, TutorPhase::Success);
    assert_eq!(second.turns[0].kind, TurnKind::Success);
    assert!(second.hint.is_none());

    let stored = store.load_progress("ada", "variables").await.unwrap().unwrap();
    assert!(stored.completed);
    assert!(stored.last_submitted_code.contains("let x"));

    // Only the first run asked for a hint.
    assert_eq!(model.requests().len(), 1);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_fault_surfaces_as_error_turn() {
    let model = Arc::new(ScriptedModel::new(&["Look closely at your quotes."]));
    let mut session = start(
        test_engine(Arc::clone(&model), Arc::new(InMemoryProgressStore::new())),
        "variables",
    )
    .await;

    let report = session.run("let x = 5;\nconsole.log(\"unterminated);").await;

    assert!(!report.result.success);
    assert!(report.result.error.is_some());
    assert_eq!(report.completion, CompletionStatus::Attempted);
    assert_eq!(report.turns[0].kind, TurnKind::Error);
    assert!(report.turns[0].text.contains("```"));
    assert_eq!(report.hint.as_deref(), Some("Look closely at your quotes."));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_runaway_loop_is_stopped() {
    let mut config = Config::default();
    config.sandbox.timeout_ms = 500;
    config.hints.enabled = false;
    let engine = Engine::with_model(
        &config,
        Arc::new(ScriptedModel::default()),
        Arc::new(InMemoryProgressStore::new()),
    )
    .with_pacing(TutorConfig::instant());
    let mut session = start(engine, "loops").await;

    let report = session.run("for (;;) {}").await;

    assert!(!report.result.success);
    assert!(report.result.error.is_some());
    assert!(report.verdicts[0].passed);
    assert_eq!(report.completion, CompletionStatus::Attempted);
}

// ============================================================================
// Simulated execution
// ============================================================================

#[tokio::test]
async fn test_python_lesson_is_simulated() {
    let model = Arc::new(ScriptedModel::new(&[
        r#"{"output": ["Hello, World!"], "error": null, "success": true}"#,
    ]));
    let mut session = start(
        test_engine(Arc::clone(&model), Arc::new(InMemoryProgressStore::new())),
        "python-greeting",
    )
    .await;

    let report = session.run("print(\"Hello, World!\")").await;

    assert_eq!(report.result.origin, ResultOrigin::Simulated);
    assert!(report.result.success);
    assert_eq!(report.result.output.len(), 1);
    assert_eq!(report.result.output[0].content, "Hello, World!");
    assert_eq!(report.completion, CompletionStatus::Completed);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].json_response);
    assert!(requests[0].user_payload.contains("python"));
}

#[tokio::test]
async fn test_simulation_failure_is_distinct_from_program_fault() {
    let model = Arc::new(ScriptedModel::new(&["this is not json"]));
    let mut session = start(
        test_engine(Arc::clone(&model), Arc::new(InMemoryProgressStore::new())),
        "python-greeting",
    )
    .await;

    let report = session.run("print('Hello, World!')").await;

    assert_eq!(report.result.origin, ResultOrigin::SimulationFailed);
    assert!(!report.result.success);
    assert!(report
        .result
        .error
        .as_deref()
        .unwrap()
        .starts_with("Simulation failed:"));
    assert_eq!(report.completion, CompletionStatus::Attempted);
    assert!(report.hint.is_none());
    assert_eq!(report.turns[0].kind, TurnKind::Error);
    assert!(report.turns[0].text.contains("couldn't predict"));

    // No hint was requested for a channel failure.
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_model_outage_is_reported_as_simulation_failure() {
    let model = Arc::new(ScriptedModel::default().then_fail("upstream unavailable"));
    let mut session = start(
        test_engine(Arc::clone(&model), Arc::new(InMemoryProgressStore::new())),
        "python-greeting",
    )
    .await;

    let report = session.run("print('Hello, World!')").await;

    assert_eq!(report.result.origin, ResultOrigin::SimulationFailed);
    assert!(report.result.error.unwrap().contains("upstream unavailable"));
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_completion_survives_new_session() {
    let dir = scratch_dir("completion");
    let path = dir.join("progress.json");

    {
        let store: Arc<dyn ProgressStore> = Arc::new(JsonFileProgressStore::new(&path));
        let mut session = start(
            test_engine(Arc::new(ScriptedModel::default()), store),
            "variables",
        )
        .await;
        let report = session.run("let x = 1;\nconsole.log(x);").await;
        assert_eq!(report.completion, CompletionStatus::Completed);
    }

    let store: Arc<dyn ProgressStore> = Arc::new(JsonFileProgressStore::new(&path));
    let mut session = start(
        test_engine(Arc::new(ScriptedModel::default()), Arc::clone(&store)),
        "variables",
    )
    .await;
    assert_eq!(session.completion(), CompletionStatus::Completed);

    // A later failing run keeps the lesson completed.
    let report = session.run("const y = 2;").await;
    assert_eq!(report.completion, CompletionStatus::Completed);
    assert!(report.hint.is_none());

    let stored = store.load_progress("ada", "variables").await.unwrap().unwrap();
    assert!(stored.completed);
    assert_eq!(stored.last_submitted_code, "const y = 2;");

    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_events_follow_stage_order() {
    let mut session = start(
        test_engine(
            Arc::new(ScriptedModel::default()),
            Arc::new(InMemoryProgressStore::new()),
        ),
        "variables",
    )
    .await;
    let mut events = session.subscribe();

    session.run("let x = 5;\nconsole.log(x);").await;

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
        if let SessionEvent::CompletionChanged(payload) = &event {
            assert_eq!(payload.from, CompletionStatus::NotStarted);
            assert_eq!(payload.to, CompletionStatus::Completed);
        }
    }

    assert_eq!(
        names,
        vec![
            "run_started",
            "run_finished",
            "graded",
            "completion_changed",
            "tutor_turn",
            "tutor_turn",
        ]
    );
    // Greeting, run commit, two tutor turns.
    assert_eq!(session.snapshot().version, 4);
}
