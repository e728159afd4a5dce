//! Phase-based tutoring conversation.
//!
//! The tutor reacts to two things: learner messages and run outcomes. Each
//! reaction is planned by a pure function that returns the next phase and the
//! turns to emit, each with the typing delay that should precede it. The
//! session driver waits out each delay and then appends that one turn through
//! [`Tutor::append`], so no two tutor turns land without a pause between them.
//!
//! Phases move `Intro -> Problem -> {Hints <-> Problem} -> Success`, and
//! nothing leaves `Success`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TutorConfig;
use crate::lesson::Lesson;
use crate::output::ResultOrigin;

/// Stage of the tutoring conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorPhase {
    /// Greeting; waiting for the learner to be ready.
    #[default]
    Intro,
    /// The problem has been revealed.
    Problem,
    /// The learner asked for help.
    Hints,
    /// The lesson was passed. Terminal.
    Success,
}

impl TutorPhase {
    /// Returns `true` for the terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for TutorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intro => write!(f, "intro"),
            Self::Problem => write!(f, "problem"),
            Self::Hints => write!(f, "hints"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// Who wrote a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The tutor.
    Tutor,
    /// The learner.
    Learner,
}

/// Presentation kind of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Ordinary message.
    #[default]
    Text,
    /// Celebrates a passed lesson.
    Success,
    /// Reports a fault.
    Error,
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// Position in the session's conversation, starting at 1.
    pub id: u64,
    /// Who wrote it.
    pub speaker: Speaker,
    /// Markdown text.
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: i64,
    /// Presentation kind.
    pub kind: TurnKind,
}

/// A tutor turn waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTurn {
    /// Pause before the turn appears.
    pub delay: Duration,
    /// Markdown text.
    pub text: String,
    /// Presentation kind.
    pub kind: TurnKind,
}

/// The tutor's reaction to one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorReply {
    /// Phase after the reaction.
    pub phase: TutorPhase,
    /// Turns to emit, in order.
    pub turns: Vec<PlannedTurn>,
}

/// What the tutor is told about a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFeedback {
    /// All checks passed on a successful run.
    pub passed: bool,
    /// This run completed the lesson for the first time.
    pub newly_completed: bool,
    /// Fault message, if the run faulted.
    pub fault: Option<String>,
    /// Messages of failing checks.
    pub failing_checks: Vec<String>,
    /// Where the result came from.
    pub origin: ResultOrigin,
    /// Hint text from the hint service.
    pub hint: Option<String>,
}

const READY_CUES: &[&str] = &["ready", "yes", "ok", "start"];
const HINT_CUES: &[&str] = &["hint", "stuck", "help"];
const EXPLAIN_CUES: &[&str] = &["explain", "understand"];
const SOLUTION_CUES: &[&str] = &["solution", "answer"];

const PROBLEM_FOLLOW_UP: &str = "Take your time reading the problem. \
Ask me anything that's unclear, or start coding and press Run when you want to check your work.";

const ENCOURAGEMENT: &str = "No rush! Say \"ready\" whenever you'd like to see the problem.";

const STRUCTURED_HINT: &str = "Here are a few things to think about:\n\n\
1. **Edge cases**: what should happen with empty, small or unusual input?\n\
2. **Iteration**: which values do you need to visit, and in what order?\n\
3. **Temporary state**: what do you need to remember from one step to the next?\n\n\
Pick one, try it in code, and run it again.";

const CONCEPT_NUDGE: &str = "Let's build the idea first. Describe in plain words what \
the program should do, step by step. Which step feels the least clear?";

const SOLUTION_REFUSAL: &str = "I won't hand you the answer, but I'll help you get there. \
Tell me what you've tried so far, or ask for a hint.";

const CODE_NUDGE: &str = "Good thinking. How would you express that in code? \
Give it a try and run it.";

const CONTINUE_CODING: &str = "You've finished this lesson! Feel free to keep coding \
and experimenting, or move on whenever you're ready.";

const CONGRATULATIONS: &str = "Great work! Your solution passes every check.";

const NEXT_LESSON: &str = "Ready for the next lesson?";

const STILL_PASSING: &str = "All checks still pass. Keep experimenting as much as you like.";

fn contains_cue(text: &str, cues: &[&str]) -> bool {
    let text = text.to_lowercase();
    cues.iter().any(|cue| text.contains(cue))
}

/// Plans the greeting that opens a session.
#[must_use]
pub fn greeting(lesson: &Lesson, pacing: &TutorConfig) -> TutorReply {
    let mut text = format!("Hi there! Welcome to **{}**.", lesson.title);
    if !lesson.description.trim().is_empty() {
        text.push(' ');
        text.push_str(lesson.description.trim());
    }
    text.push_str("\n\nAre you ready to get started?");

    TutorReply {
        phase: TutorPhase::Intro,
        turns: vec![turn(pacing.typing_delay(), text, TurnKind::Text)],
    }
}

/// Plans the reaction to a learner message.
#[must_use]
pub fn react_to_message(
    phase: TutorPhase,
    text: &str,
    lesson: &Lesson,
    pacing: &TutorConfig,
) -> TutorReply {
    let typing = pacing.typing_delay();
    let (phase, turns) = match phase {
        TutorPhase::Intro if contains_cue(text, READY_CUES) => (
            TutorPhase::Problem,
            vec![
                turn(typing, lesson.statement(), TurnKind::Text),
                turn(pacing.follow_up_delay(), PROBLEM_FOLLOW_UP, TurnKind::Text),
            ],
        ),
        TutorPhase::Intro => (
            TutorPhase::Intro,
            vec![turn(typing, ENCOURAGEMENT, TurnKind::Text)],
        ),
        TutorPhase::Problem | TutorPhase::Hints => {
            if contains_cue(text, HINT_CUES) {
                (
                    TutorPhase::Hints,
                    vec![turn(typing, STRUCTURED_HINT, TurnKind::Text)],
                )
            } else if contains_cue(text, EXPLAIN_CUES) {
                (phase, vec![turn(typing, CONCEPT_NUDGE, TurnKind::Text)])
            } else if contains_cue(text, SOLUTION_CUES) {
                (phase, vec![turn(typing, SOLUTION_REFUSAL, TurnKind::Text)])
            } else {
                (phase, vec![turn(typing, CODE_NUDGE, TurnKind::Text)])
            }
        }
        TutorPhase::Success => (
            TutorPhase::Success,
            vec![turn(typing, CONTINUE_CODING, TurnKind::Text)],
        ),
    };
    TutorReply { phase, turns }
}

/// Plans the reaction to a finished run.
///
/// A failed run outside `Success` returns the conversation to `Problem`.
#[must_use]
pub fn react_to_run(phase: TutorPhase, feedback: &RunFeedback, pacing: &TutorConfig) -> TutorReply {
    let typing = pacing.typing_delay();

    if feedback.passed {
        let turns = if feedback.newly_completed {
            vec![
                turn(typing, CONGRATULATIONS, TurnKind::Success),
                turn(pacing.follow_up_delay(), NEXT_LESSON, TurnKind::Text),
            ]
        } else {
            vec![turn(typing, STILL_PASSING, TurnKind::Text)]
        };
        return TutorReply {
            phase: TutorPhase::Success,
            turns,
        };
    }

    let mut turns = Vec::with_capacity(2);
    match (&feedback.fault, feedback.origin) {
        (Some(fault), ResultOrigin::SimulationFailed) => turns.push(turn(
            typing,
            format!(
                "I couldn't predict how this code would run. {fault}\n\n\
                 Nothing is wrong with your submission as far as I know; please run it again in a moment."
            ),
            TurnKind::Error,
        )),
        (Some(fault), _) => turns.push(turn(
            typing,
            format!(
                "Your code ran into an error:\n\n```\n{fault}\n```\n\n\
                 Check the syntax around where the error points, then try again."
            ),
            TurnKind::Error,
        )),
        (None, _) => turns.push(turn(typing, recheck_text(&feedback.failing_checks), TurnKind::Text)),
    }

    if let Some(hint) = feedback.hint.as_deref().filter(|h| !h.trim().is_empty()) {
        turns.push(turn(typing, format!("Hint: {hint}"), TurnKind::Text));
    }

    let phase = if phase.is_terminal() {
        TutorPhase::Success
    } else {
        TutorPhase::Problem
    };
    TutorReply { phase, turns }
}

fn recheck_text(failing_checks: &[String]) -> String {
    if failing_checks.is_empty() {
        return "Your code ran, but the result isn't what the lesson expects yet. \
                Recheck the requirements and try again."
            .to_string();
    }
    let mut text = "Your code ran, but it doesn't meet every requirement yet:\n".to_string();
    for message in failing_checks {
        text.push_str("\n- ");
        text.push_str(message);
    }
    text.push_str("\n\nRecheck the requirements and try again.");
    text
}

fn turn(delay: Duration, text: impl Into<String>, kind: TurnKind) -> PlannedTurn {
    PlannedTurn {
        delay,
        text: text.into(),
        kind,
    }
}

/// Conversation state for one session.
#[derive(Debug, Clone, Default)]
pub struct Tutor {
    phase: TutorPhase,
    turns: Vec<ChatTurn>,
}

impl Tutor {
    /// Creates a tutor in `Intro` with no turns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TutorPhase {
        self.phase
    }

    /// All turns so far, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    fn push(&mut self, speaker: Speaker, text: String, kind: TurnKind, now_ms: i64) -> ChatTurn {
        let turn = ChatTurn {
            id: self.turns.len() as u64 + 1,
            speaker,
            text,
            created_at_ms: now_ms,
            kind,
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Appends a learner message.
    pub fn record_learner(&mut self, text: impl Into<String>, now_ms: i64) -> ChatTurn {
        self.push(Speaker::Learner, text.into(), TurnKind::Text, now_ms)
    }

    /// Moves to `phase`. Nothing leaves `Success`.
    pub fn advance(&mut self, phase: TutorPhase) {
        if !self.phase.is_terminal() {
            self.phase = phase;
        }
    }

    /// Appends one planned tutor turn.
    pub fn append(&mut self, planned: PlannedTurn, now_ms: i64) -> ChatTurn {
        self.push(Speaker::Tutor, planned.text, planned.kind, now_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lesson::LessonCheck;

    fn lesson() -> Lesson {
        Lesson {
            id: "variables".to_string(),
            title: "Variables".to_string(),
            description: "Learn to declare variables with let.".to_string(),
            content: "Declare `x` and set it to 5.".to_string(),
            language: "javascript".to_string(),
            checks: vec![LessonCheck::source_pattern(r"let\s+x", "Use let")],
        }
    }

    fn instant() -> TutorConfig {
        TutorConfig::instant()
    }

    fn failure(fault: Option<&str>, origin: ResultOrigin) -> RunFeedback {
        RunFeedback {
            passed: false,
            newly_completed: false,
            fault: fault.map(str::to_string),
            failing_checks: vec!["Use let".to_string()],
            origin,
            hint: None,
        }
    }

    fn pass(newly_completed: bool) -> RunFeedback {
        RunFeedback {
            passed: true,
            newly_completed,
            fault: None,
            failing_checks: Vec::new(),
            origin: ResultOrigin::Native,
            hint: None,
        }
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    #[test]
    fn test_greeting_names_lesson_and_asks_ready() {
        let reply = greeting(&lesson(), &instant());
        assert_eq!(reply.phase, TutorPhase::Intro);
        assert_eq!(reply.turns.len(), 1);
        assert!(reply.turns[0].text.contains("Variables"));
        assert!(reply.turns[0].text.contains("ready"));
    }

    #[test]
    fn test_ready_reveals_problem() {
        let reply = react_to_message(TutorPhase::Intro, "I'm ready!", &lesson(), &instant());

        assert_eq!(reply.phase, TutorPhase::Problem);
        assert_eq!(reply.turns.len(), 2);
        assert!(reply.turns[0].text.contains("Learn to declare variables with let."));
        assert!(reply.turns[0].text.contains("Declare `x` and set it to 5."));
        assert!(reply.turns[0].text.contains("Variables"));
    }

    #[test]
    fn test_ready_cues_case_insensitive() {
        for text in ["YES please", "ok", "Let's START", "Ready"] {
            let reply = react_to_message(TutorPhase::Intro, text, &lesson(), &instant());
            assert_eq!(reply.phase, TutorPhase::Problem, "cue: {text}");
        }
    }

    #[test]
    fn test_intro_other_message_encourages() {
        let reply = react_to_message(TutorPhase::Intro, "hmm, what's this?", &lesson(), &instant());
        assert_eq!(reply.phase, TutorPhase::Intro);
        assert_eq!(reply.turns[0].text, ENCOURAGEMENT);
    }

    #[test]
    fn test_problem_cue_routing() {
        let cases = [
            ("I'm stuck", TutorPhase::Hints, STRUCTURED_HINT),
            ("can you explain closures?", TutorPhase::Problem, CONCEPT_NUDGE),
            ("just give me the solution", TutorPhase::Problem, SOLUTION_REFUSAL),
            ("I think I need a variable", TutorPhase::Problem, CODE_NUDGE),
        ];
        for (text, phase, expected) in cases {
            let reply = react_to_message(TutorPhase::Problem, text, &lesson(), &instant());
            assert_eq!(reply.phase, phase, "message: {text}");
            assert_eq!(reply.turns[0].text, expected, "message: {text}");
        }
    }

    #[test]
    fn test_hints_phase_stays_on_other_cues() {
        let reply = react_to_message(TutorPhase::Hints, "what is the answer", &lesson(), &instant());
        assert_eq!(reply.phase, TutorPhase::Hints);
        assert_eq!(reply.turns[0].text, SOLUTION_REFUSAL);
    }

    #[test]
    fn test_structured_hint_mentions_three_angles() {
        let text = STRUCTURED_HINT.to_lowercase();
        assert!(text.contains("edge cases"));
        assert!(text.contains("iteration"));
        assert!(text.contains("temporary state"));
    }

    #[test]
    fn test_success_messages_continue_coding() {
        let reply = react_to_message(TutorPhase::Success, "hint please", &lesson(), &instant());
        assert_eq!(reply.phase, TutorPhase::Success);
        assert_eq!(reply.turns[0].text, CONTINUE_CODING);
    }

    #[test]
    fn test_delays_follow_pacing() {
        let pacing = TutorConfig {
            typing_delay_ms: 100,
            follow_up_delay_ms: 250,
        };
        let reply = react_to_message(TutorPhase::Intro, "ready", &lesson(), &pacing);
        assert_eq!(reply.turns[0].delay, Duration::from_millis(100));
        assert_eq!(reply.turns[1].delay, Duration::from_millis(250));
    }

    // ------------------------------------------------------------------------
    // Run outcomes
    // ------------------------------------------------------------------------

    #[test]
    fn test_success_run_congratulates() {
        let reply = react_to_run(TutorPhase::Problem, &pass(true), &instant());
        assert_eq!(reply.phase, TutorPhase::Success);
        assert_eq!(reply.turns.len(), 2);
        assert_eq!(reply.turns[0].kind, TurnKind::Success);
        assert!(reply.turns[1].text.contains("next lesson"));
    }

    #[test]
    fn test_repeat_pass_does_not_congratulate_again() {
        let reply = react_to_run(TutorPhase::Success, &pass(false), &instant());
        assert_eq!(reply.phase, TutorPhase::Success);
        assert_eq!(reply.turns.len(), 1);
        assert_eq!(reply.turns[0].kind, TurnKind::Text);
    }

    #[test]
    fn test_fault_quotes_error() {
        let reply = react_to_run(
            TutorPhase::Problem,
            &failure(Some("x is not defined"), ResultOrigin::Native),
            &instant(),
        );
        assert_eq!(reply.phase, TutorPhase::Problem);
        assert_eq!(reply.turns[0].kind, TurnKind::Error);
        assert!(reply.turns[0].text.contains("x is not defined"));
        assert!(reply.turns[0].text.contains("syntax"));
    }

    #[test]
    fn test_failed_checks_listed_neutrally() {
        let reply = react_to_run(TutorPhase::Problem, &failure(None, ResultOrigin::Native), &instant());
        assert_eq!(reply.turns[0].kind, TurnKind::Text);
        assert!(reply.turns[0].text.contains("- Use let"));
    }

    #[test]
    fn test_hint_follows_as_own_turn() {
        let feedback = RunFeedback {
            hint: Some("Look at how x is declared.".to_string()),
            ..failure(None, ResultOrigin::Native)
        };
        let reply = react_to_run(TutorPhase::Problem, &feedback, &instant());
        assert_eq!(reply.turns.len(), 2);
        assert_eq!(reply.turns[1].text, "Hint: Look at how x is declared.");
    }

    #[test]
    fn test_simulation_failure_turn_is_distinct() {
        let reply = react_to_run(
            TutorPhase::Problem,
            &failure(Some("Simulation failed: timeout"), ResultOrigin::SimulationFailed),
            &instant(),
        );
        assert_eq!(reply.turns[0].kind, TurnKind::Error);
        assert!(reply.turns[0].text.contains("couldn't predict"));
    }

    #[test]
    fn test_failed_run_in_hints_returns_to_problem() {
        let reply = react_to_run(TutorPhase::Hints, &failure(None, ResultOrigin::Native), &instant());
        assert_eq!(reply.phase, TutorPhase::Problem);
    }

    #[test]
    fn test_failed_run_after_success_keeps_phase() {
        let reply = react_to_run(
            TutorPhase::Success,
            &failure(Some("boom"), ResultOrigin::Native),
            &instant(),
        );
        assert_eq!(reply.phase, TutorPhase::Success);
        assert!(reply.turns[0].text.contains("boom"));
    }

    // ------------------------------------------------------------------------
    // Tutor state
    // ------------------------------------------------------------------------

    #[test]
    fn test_append_assigns_sequential_ids() {
        let mut tutor = Tutor::new();
        let greeting = greeting(&lesson(), &instant());
        tutor.advance(greeting.phase);
        for planned in greeting.turns {
            tutor.append(planned, 10);
        }
        let learner = tutor.record_learner("ready", 20);

        let reply = react_to_message(tutor.phase(), "ready", &lesson(), &instant());
        tutor.advance(reply.phase);
        let appended: Vec<ChatTurn> = reply
            .turns
            .into_iter()
            .zip([30, 40])
            .map(|(planned, at)| tutor.append(planned, at))
            .collect();

        assert_eq!(learner.id, 2);
        assert_eq!(learner.speaker, Speaker::Learner);
        assert_eq!(appended.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(appended[1].created_at_ms, 40);
        assert!(appended.iter().all(|t| t.speaker == Speaker::Tutor));
        assert_eq!(tutor.turns().len(), 4);
        assert_eq!(tutor.phase(), TutorPhase::Problem);
    }

    #[test]
    fn test_advance_never_leaves_success() {
        let mut tutor = Tutor::new();
        tutor.advance(react_to_run(TutorPhase::Problem, &pass(true), &instant()).phase);
        assert_eq!(tutor.phase(), TutorPhase::Success);

        tutor.advance(TutorPhase::Problem);
        assert_eq!(tutor.phase(), TutorPhase::Success);
    }

    #[test]
    fn test_turn_serialization() {
        let turn = ChatTurn {
            id: 1,
            speaker: Speaker::Tutor,
            text: "hi".to_string(),
            created_at_ms: 1_700_000_000_000,
            kind: TurnKind::Success,
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["speaker"], "tutor");
        assert_eq!(json["kind"], "success");
        assert_eq!(json["createdAtMs"], 1_700_000_000_000_i64);
    }
}
