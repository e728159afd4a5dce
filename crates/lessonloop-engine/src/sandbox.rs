//! In-process JavaScript execution.
//!
//! Learner code runs inside a fresh `boa_engine` context on a blocking
//! thread. The only capability the program sees is a captured `console`;
//! there is no host I/O, network or storage. Loop iterations, call depth and
//! wall-clock time are all bounded, and hitting any bound is reported as a
//! fault like any other.

use std::rc::Rc;
use std::time::Instant;

use boa_engine::context::ContextBuilder;
use boa_engine::job::SimpleJobQueue;
use boa_engine::{Context, Source};
use serde::Deserialize;

use crate::config::SandboxConfig;
use crate::output::{ExecutionResult, OutputEntry, OutputLog, ResultOrigin};

/// Installed before the learner's program. Replaces `__ENTRY_LIMIT__` with
/// the configured output cap.
const PRELUDE: &str = r#"
(() => {
  const started = Date.now();
  const limit = __ENTRY_LIMIT__;
  const state = { entries: [], dropped: 0, done: false, fault: null };

  const describe = (err) => {
    if (err !== null && typeof err === "object" && "message" in err) {
      const name = err.name ? String(err.name) : "Error";
      const message = String(err.message);
      if (message.length === 0) return name;
      return name === "Error" ? message : `${name}: ${message}`;
    }
    return String(err);
  };

  const render = (value) => {
    if (typeof value === "string") return value;
    if (value instanceof Error) return describe(value);
    if (value !== null && typeof value === "object") {
      try {
        const json = JSON.stringify(value);
        if (json !== undefined) return json;
      } catch (_) {}
    }
    return String(value);
  };

  const record = (kind, args) => {
    if (state.entries.length >= limit) {
      state.dropped += 1;
      return;
    }
    state.entries.push({
      kind,
      content: args.map(render).join(" "),
      offsetMs: Date.now() - started,
    });
  };

  const hidden = (name, value) =>
    Object.defineProperty(globalThis, name, {
      value,
      writable: false,
      enumerable: false,
      configurable: false,
    });

  globalThis.console = {
    log: (...args) => record("log", args),
    debug: (...args) => record("log", args),
    info: (...args) => record("info", args),
    warn: (...args) => record("warn", args),
    error: (...args) => record("error", args),
  };

  let nextTimer = 1;
  const cancelled = new Set();
  globalThis.setTimeout = (callback, _delay, ...args) => {
    const id = nextTimer++;
    Promise.resolve().then(() => {
      if (!cancelled.has(id) && typeof callback === "function") callback(...args);
    });
    return id;
  };
  globalThis.clearTimeout = (id) => {
    cancelled.add(id);
  };

  hidden("__lessonloopFinish", (value) => {
    if (value !== undefined) record("result", [value]);
    state.done = true;
  });
  hidden("__lessonloopFail", (err) => {
    state.fault = describe(err);
  });
  hidden("__lessonloopCollect", () => JSON.stringify(state));
})();
"#;

/// Fault reported when the program neither finished nor threw.
const UNFINISHED_ERROR: &str =
    "Program did not finish (a loop or recursion limit may have been exceeded)";

/// State read back from the interpreter after a run.
#[derive(Debug, Default, Deserialize)]
struct Collected {
    #[serde(default)]
    entries: Vec<OutputEntry>,
    #[serde(default)]
    dropped: usize,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    fault: Option<String>,
}

impl Collected {
    fn fault(message: impl Into<String>) -> Self {
        Self {
            fault: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Runs JavaScript in an isolated interpreter.
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    /// Creates a sandbox with the given bounds.
    #[must_use]
    pub const fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// The bounds this sandbox applies.
    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Runs `code` to completion, including any pending promise jobs.
    ///
    /// Never fails: faults in the program, exhausted bounds and interpreter
    /// crashes all come back as an unsuccessful [`ExecutionResult`].
    pub async fn run(&self, code: &str) -> ExecutionResult {
        if ExecutionResult::is_blank(code) {
            return ExecutionResult::no_code(ResultOrigin::Native);
        }

        let started = Instant::now();
        let limits = self.config.clone();
        let source = code.to_string();
        let task = tokio::task::spawn_blocking(move || evaluate(&source, &limits));

        let collected = match tokio::time::timeout(self.config.timeout(), task).await {
            Ok(Ok(collected)) => collected,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Sandbox thread failed");
                Collected::fault(format!("Sandbox crashed: {e}"))
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.timeout_ms, "Sandbox run timed out");
                Collected::fault(format!(
                    "Execution timed out after {}ms",
                    self.config.timeout_ms
                ))
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = self.finish(collected, duration_ms);

        tracing::debug!(
            success = result.success,
            entries = result.output.len(),
            duration_ms,
            "Sandbox run finished"
        );
        result
    }

    fn finish(&self, collected: Collected, duration_ms: f64) -> ExecutionResult {
        let mut log = OutputLog::with_capacity(self.config.max_output_entries);
        for entry in collected.entries {
            log.push(entry.kind, entry.content, entry.offset_ms);
        }
        log.note_dropped(collected.dropped);
        let output = log.finish();

        match (collected.fault, collected.done) {
            (Some(fault), _) => {
                ExecutionResult::faulted(output, fault, duration_ms, ResultOrigin::Native)
            }
            (None, true) => ExecutionResult::completed(output, duration_ms, ResultOrigin::Native),
            (None, false) => ExecutionResult::faulted(
                output,
                UNFINISHED_ERROR,
                duration_ms,
                ResultOrigin::Native,
            ),
        }
    }
}

/// Wraps the learner's program in an async body so `await` and top-level
/// `return` both work.
fn wrap_program(code: &str) -> String {
    format!(
        "(async () => {{\n{code}\n}})().then(\n  (value) => __lessonloopFinish(value),\n  (err) => __lessonloopFail(err)\n);\n"
    )
}

/// Runs on a blocking thread; the interpreter context never leaves it.
fn evaluate(code: &str, limits: &SandboxConfig) -> Collected {
    let built = ContextBuilder::new()
        .job_queue(Rc::new(SimpleJobQueue::new()))
        .build();
    let mut context = match built {
        Ok(context) => context,
        Err(e) => return Collected::fault(format!("Failed to start interpreter: {e}")),
    };

    let prelude = PRELUDE.replace("__ENTRY_LIMIT__", &limits.max_output_entries.to_string());
    if let Err(e) = context.eval(Source::from_bytes(prelude.as_bytes())) {
        return Collected::fault(format!("Failed to prepare interpreter: {e}"));
    }

    let runtime_limits = context.runtime_limits_mut();
    runtime_limits.set_loop_iteration_limit(limits.loop_iteration_limit);
    runtime_limits.set_recursion_limit(limits.recursion_limit);

    let program = wrap_program(code);
    let eval_error = context.eval(Source::from_bytes(program.as_bytes())).err();
    context.run_jobs();

    let mut collected = match read_state(&mut context) {
        Ok(collected) => collected,
        Err(message) => Collected::fault(format!("Failed to read program output: {message}")),
    };

    if let Some(e) = eval_error {
        if collected.fault.is_none() {
            collected.fault = Some(e.to_string());
        }
    }

    collected
}

fn read_state(context: &mut Context) -> Result<Collected, String> {
    let value = context
        .eval(Source::from_bytes("__lessonloopCollect()"))
        .map_err(|e| e.to_string())?;
    let json = value
        .to_string(context)
        .map_err(|e| e.to_string())?
        .to_std_string_escaped();
    serde_json::from_str(&json).map_err(|e| e.to_string())
}
