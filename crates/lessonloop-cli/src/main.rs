//! LessonLoop CLI
//!
//! Hosts lesson sessions over HTTP, or runs one submission against a lesson
//! from the terminal.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use lessonloop_engine::{
    create_router, AppState, CompletionStatus, Config, Engine, LessonCatalog, LessonSession,
    ResultOrigin, RunReport, Speaker, TurnKind, TutorConfig,
};
use lessonloop_report::{
    json::JsonGenerator, MarkdownGenerator, Report, ReportStatus, RunOrigin, RunRecord,
    TranscriptTurn,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Exit code for a run that faulted or failed a check.
const EXIT_RUN_FAILED: u8 = 2;

/// LessonLoop - interactive programming lessons
///
/// Runs learner code, grades it against lesson checks, and keeps a tutor
/// conversation going alongside.
#[derive(Parser, Debug)]
#[command(name = "lessonloop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: lessonloop.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Directory containing lesson JSON files
    #[arg(long, value_name = "DIR", global = true)]
    lessons_dir: Option<String>,

    /// Skip the tutor's typing delays
    #[arg(long, global = true)]
    no_delay: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket API
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Run one submission against a lesson and print the outcome
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Lesson identifier
    #[arg(short, long)]
    lesson: String,

    /// File containing the code to run ("-" reads stdin)
    #[arg(value_name = "CODE_FILE")]
    code: String,

    /// Learner identifier used for stored progress
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Chat message to send before running (repeatable)
    #[arg(short, long = "message", value_name = "TEXT")]
    messages: Vec<String>,

    /// Write Markdown and JSON reports into this directory
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Print the run report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?cli.config, "Config file");

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(ref dir) = cli.lessons_dir {
        config.lessons_dir.clone_from(dir);
    }
    if cli.no_delay {
        config.tutor = TutorConfig::instant();
    }

    // Re-validate after overrides
    config.validate()?;

    match cli.command {
        Command::Serve { port } => {
            serve(&config, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => run_once(&config, args).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

fn load_catalog(config: &Config) -> anyhow::Result<LessonCatalog> {
    let catalog = LessonCatalog::load_dir(&config.lessons_dir)?;
    if catalog.is_empty() {
        tracing::warn!(lessons_dir = %config.lessons_dir, "No lessons found");
    }
    Ok(catalog)
}

// ============================================================================
// serve
// ============================================================================

async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let catalog = load_catalog(config)?;
    let engine = Engine::from_config(config)?;

    println!("Lessons loaded: {} from {}", catalog.len(), config.lessons_dir);
    println!("Progress file: {}", config.progress_file);
    println!("Model: {} via {:?}", config.model.model, config.model.provider);

    let router = create_router(AppState::new(engine, catalog));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Use --port to choose a free port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Serving");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

// ============================================================================
// run
// ============================================================================

async fn run_once(config: &Config, args: RunArgs) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(config)?;
    let lesson = catalog.get(&args.lesson)?.clone();
    let code = read_code(&args.code).await?;
    let engine = Engine::from_config(config)?;

    let session_id = format!("cli-{}", std::process::id());
    let mut session = LessonSession::start(engine, session_id, args.user.clone(), lesson).await;

    for message in &args.messages {
        session.send_message(message).await;
    }
    let report = session.run(&code).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_transcript(&session);
        print_run(&report);
    }

    if let Some(ref dir) = args.output_dir {
        write_reports(&session, Path::new(dir))?;
    }

    let passed = report.result.success && report.verdicts.iter().all(|v| v.passed);
    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_RUN_FAILED)
    })
}

async fn read_code(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        use tokio::io::AsyncReadExt;
        let mut code = String::new();
        tokio::io::stdin().read_to_string(&mut code).await?;
        return Ok(code);
    }

    tokio::fs::read_to_string(source).await.map_err(|e| {
        anyhow::anyhow!("Failed to read code file '{source}': {e}")
    })
}

fn print_transcript(session: &LessonSession) {
    for turn in session.turns() {
        let who = match turn.speaker {
            Speaker::Tutor => "tutor",
            Speaker::Learner => "you",
        };
        println!("[{who}] {}", turn.text.replace('\n', "\n      "));
        println!();
    }
}

fn print_run(report: &RunReport) {
    let origin = match report.result.origin {
        ResultOrigin::Native => "executed",
        ResultOrigin::Simulated => "predicted",
        ResultOrigin::SimulationFailed => "prediction failed",
    };
    println!("=== Run #{} ({origin}, {:.0}ms) ===", report.run, report.result.duration_ms);
    if report.result.origin.is_prediction() {
        println!("  Note: output comes from the model, the code was not executed");
    }

    for entry in &report.result.output {
        println!("  {:>6} | {}", entry.kind.to_string(), entry.content);
    }
    if let Some(ref error) = report.result.error {
        println!("  Error: {error}");
    }

    for verdict in &report.verdicts {
        let mark = if verdict.passed { "PASS" } else { "FAIL" };
        println!("  [{mark}] {}", verdict.message);
    }

    println!("Completion: {}", report.completion);
    if !report.persisted {
        println!("Warning: progress was not saved");
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Writes `lessonloop-report.md` and `lessonloop-report.json` into `dir`.
fn write_reports(session: &LessonSession, dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        anyhow::anyhow!("Failed to create output directory: {e}\n\nPath: {}", dir.display())
    })?;

    let report = build_report(session)?;

    let md_path: PathBuf = dir.join("lessonloop-report.md");
    MarkdownGenerator::new(&report).write_to_file(&md_path)?;
    println!("Markdown report: {}", md_path.display());

    let json_path = dir.join("lessonloop-report.json");
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("JSON report: {}", json_path.display());

    Ok(())
}

fn build_report(session: &LessonSession) -> anyhow::Result<Report> {
    let lesson = session.lesson();
    let report = Report::builder()
        .lesson(&lesson.id, &lesson.title, &lesson.language)
        .user_id(session.user_id())
        .status(convert_status(session.completion()))
        .phase(session.phase().to_string())
        .runs(session.history().iter().map(convert_run).collect())
        .transcript(
            session
                .turns()
                .iter()
                .map(|turn| {
                    let base = match turn.speaker {
                        Speaker::Tutor => TranscriptTurn::tutor(&turn.text),
                        Speaker::Learner => TranscriptTurn::learner(&turn.text),
                    };
                    match turn.kind {
                        TurnKind::Text => base,
                        TurnKind::Success => base.styled("success"),
                        TurnKind::Error => base.styled("error"),
                    }
                })
                .collect(),
        )
        .build()?;
    Ok(report)
}

const fn convert_status(status: CompletionStatus) -> ReportStatus {
    match status {
        CompletionStatus::NotStarted => ReportStatus::NotStarted,
        CompletionStatus::Attempted => ReportStatus::Attempted,
        CompletionStatus::Completed => ReportStatus::Completed,
    }
}

fn convert_run(run: &RunReport) -> RunRecord {
    let origin = match run.result.origin {
        ResultOrigin::Native => RunOrigin::Native,
        ResultOrigin::Simulated => RunOrigin::Simulated,
        ResultOrigin::SimulationFailed => RunOrigin::SimulationFailed,
    };

    let duration = whole_ms(run.result.duration_ms);
    let mut record = RunRecord::new(run.run, origin, run.result.success, duration);
    for entry in &run.result.output {
        let offset = whole_ms(entry.offset_ms);
        record = record.output_line(entry.kind.to_string(), &entry.content, offset);
    }
    for verdict in &run.verdicts {
        record = record.check(verdict.passed, &verdict.message);
    }
    if let Some(ref error) = run.result.error {
        record = record.error(error);
    }
    if let Some(ref hint) = run.hint {
        record = record.hint(hint);
    }
    if run.newly_completed {
        record = record.completing();
    }
    record
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_ms(ms: f64) -> u64 {
    ms.max(0.0).round() as u64
}
