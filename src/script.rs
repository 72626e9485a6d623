//! Script workers: test functions living in external script files, run by an interpreter.
//!
//! Script discovery yields identifiers like `suite/cache_test.js.testGet`. The bridge deploys the script path as
//! the worker unit and `testGet` as the method; a [`ScriptWorker`] then asks its [`ScriptHost`] to invoke that
//! function and turns the outcome into the test's completion message.
//!
//! A failed run whose output contains an assertion line is reported as an assertion failure, like a failed
//! `assert_*` call in a native worker; any other non-zero exit is reported as an error.

use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harness_core::FailureCapsule;
use thiserror::Error;
use tokio::process::Command;

use crate::platform::WorkerContext;
use crate::worker::WorkerInstance;

/// Environment variable carrying the selected function name to the interpreter.
pub const METHOD_ENV: &str = "WORKER_HARNESS_METHOD";

/// Environment variable carrying the full worker configuration (JSON) to the interpreter.
pub const CONFIG_ENV: &str = "WORKER_HARNESS_CONFIG";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The interpreter reported a failed assertion.
    #[error("{message}")]
    Assertion { status: Option<i32>, message: String },

    #[error("{message}")]
    Failed { status: Option<i32>, message: String },

    /// The deployment was undeployed while the interpreter was still running; it has been killed.
    #[error("`{0}` was cancelled by undeploy")]
    Cancelled(String),
}

impl ScriptError {
    fn type_name(&self) -> &'static str {
        match self {
            ScriptError::Launch { .. } => "ScriptLaunchError",
            ScriptError::Assertion { .. } => "AssertionFailed",
            ScriptError::Failed { .. } => "ScriptError",
            ScriptError::Cancelled(_) => "ScriptCancelled",
        }
    }
}

/// Runs one function of one script.
pub trait ScriptHost: Send + Sync {
    /// Invoke `function` in `script` (relative to the scripts directory) and wait for it to finish.
    ///
    /// Implementations must give up with [`ScriptError::Cancelled`] once the deployment is undeployed.
    fn invoke(&self, script: &Path, function: &str, ctx: &WorkerContext) -> Result<(), ScriptError>;
}

/// [`ScriptHost`] that launches an external interpreter per test.
///
/// Arguments are a template; `{script}` and `{function}` are substituted in every argument. A template with no
/// placeholder at all gets the script and function appended.
///
/// The interpreter runs on the deployment's runtime and is killed if the deployment is undeployed first.
#[derive(Debug, Clone)]
pub struct CommandScriptHost {
    root: PathBuf,
    program: String,
    args: Vec<String>,
}

impl CommandScriptHost {
    pub fn new(root: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand the argument template for one invocation.
    pub fn command_args(&self, script: &Path, function: &str) -> Vec<String> {
        let script = script.to_string_lossy();
        let templated = self
            .args
            .iter()
            .any(|a| a.contains("{script}") || a.contains("{function}"));
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{script}", &script).replace("{function}", function))
            .collect();
        if !templated {
            args.push(script.into_owned());
            args.push(function.to_string());
        }
        args
    }
}

impl ScriptHost for CommandScriptHost {
    fn invoke(&self, script: &Path, function: &str, ctx: &WorkerContext) -> Result<(), ScriptError> {
        let args = self.command_args(script, function);
        tracing::debug!(program = %self.program, ?args, "launching script interpreter");
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(&self.root)
            .env(METHOD_ENV, function)
            .env(CONFIG_ENV, ctx.config().to_value().to_string())
            .kill_on_drop(true);
        let output = ctx
            .block_on(async move { command.output().await })
            .ok_or_else(|| ScriptError::Cancelled(function.to_string()))?
            .map_err(|source| ScriptError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = output.status.code();
        match diagnose(&stdout, &stderr) {
            Some(Diagnosis::Assertion(message)) => Err(ScriptError::Assertion { status, message }),
            Some(Diagnosis::Other(message)) => Err(ScriptError::Failed { status, message }),
            None => {
                let message = match status {
                    Some(code) => format!("`{function}` exited with status {code}"),
                    None => format!("`{function}` was terminated by a signal"),
                };
                Err(ScriptError::Failed { status, message })
            }
        }
    }
}

/// The most useful failure line(s) of an interpreter's output.
#[derive(Debug, PartialEq, Eq)]
enum Diagnosis {
    Assertion(String),
    Other(String),
}

fn diagnose(stdout: &str, stderr: &str) -> Option<Diagnosis> {
    if let Some(line) = extract_assertion_error(stderr).or_else(|| extract_assertion_error(stdout)) {
        return Some(Diagnosis::Assertion(line));
    }
    extract_panic_message(stderr)
        .or_else(|| extract_panic_message(stdout))
        .or_else(|| {
            let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
            let combined = combined.trim();
            (!combined.is_empty()).then(|| combined.to_string())
        })
        .map(Diagnosis::Other)
}

fn extract_assertion_error(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("AssertionError") || line.contains("assertion"))
        .map(|line| line.trim().to_string())
}

fn extract_panic_message(output: &str) -> Option<String> {
    let mut in_panic = false;
    let mut msg = String::new();

    for line in output.lines() {
        if line.contains("panicked at") {
            in_panic = true;
            msg.push_str(line.trim());
            msg.push('\n');
        } else if in_panic && line.starts_with("  ") {
            msg.push_str(line);
            msg.push('\n');
        } else if in_panic && line.is_empty() {
            break;
        }
    }

    (!msg.is_empty()).then(|| msg.trim_end().to_string())
}

/// A deployed script: runs the selected function through a host and reports the outcome.
///
/// A script function always completes on return; it has no way to signal completion later.
pub struct ScriptWorker {
    host: Arc<dyn ScriptHost>,
    script: PathBuf,
}

impl ScriptWorker {
    pub fn new(host: Arc<dyn ScriptHost>, script: impl Into<PathBuf>) -> Self {
        Self {
            host,
            script: script.into(),
        }
    }
}

impl WorkerInstance for ScriptWorker {
    fn start(&mut self, _ctx: &WorkerContext) {}

    fn run(&mut self, ctx: &WorkerContext) {
        let asserter = ctx.asserter();
        let Some(function) = ctx.method_name() else {
            asserter.handle_failure(FailureCapsule::error(
                "MissingMethodName",
                "worker configuration does not name a script function",
            ));
            return;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| self.host.invoke(&self.script, function, ctx)));
        if asserter.has_signalled() {
            return;
        }
        match outcome {
            Ok(Ok(())) => asserter.test_complete(),
            Ok(Err(ScriptError::Assertion { message, .. })) => {
                asserter.handle_failure(FailureCapsule::assertion(Some(message)));
            }
            Ok(Err(ScriptError::Cancelled(function))) => {
                tracing::debug!(script = %self.script.display(), %function, "script cancelled; nothing to report");
            }
            Ok(Err(err)) => asserter.handle_error(err.type_name(), &err),
            Err(payload) => asserter.handle_panic(payload.as_ref()),
        }
    }

    fn stop(&mut self, _ctx: &WorkerContext) {}
}
