//! CLI module for the worker harness
//!
//! ## Commands
//!
//! - `discover --root DIR` - List the script tests found under a directory
//! - `run --root DIR --interpreter PROG [-- ARGS...]` - Run script tests through the execution bridge
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use crate::config::SuiteInfo;
use crate::runner::RunOptions;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// At least one test failed or was aborted.
    pub const FAILURE: ExitCode = ExitCode(1);
    /// Discovery or configuration failed; no test ran.
    pub const SETUP: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create a setup error (exit code 2).
    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::SETUP)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run tests inside isolated workers and report them like ordinary tests
#[derive(Parser, Debug)]
#[command(name = "worker-harness")]
#[command(version = VERSION)]
#[command(about = "Run tests inside isolated workers and report them like ordinary tests", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where script tests live and how to recognise them.
#[derive(Args, Debug, Clone)]
pub struct SuiteArgs {
    /// Scripts directory, searched recursively
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,
    /// Regular expression matched against whole file base names
    #[arg(long, value_name = "RE")]
    pub filter: Option<String>,
    /// Regular expression whose first capture group is a test function name
    #[arg(long = "function", value_name = "RE")]
    pub function: Option<String>,
    /// Resource manifest passed with every deployment
    #[arg(long, value_name = "MANIFEST")]
    pub includes: Option<String>,
}

impl SuiteArgs {
    pub fn suite_info(&self) -> SuiteInfo {
        let mut suite = SuiteInfo::new(&self.root);
        if let Some(filter) = &self.filter {
            suite = suite.with_filename_filter(filter.as_str());
        }
        if let Some(function) = &self.function {
            suite = suite.with_function_pattern(function.as_str());
        }
        if let Some(includes) = &self.includes {
            suite = suite.with_includes(includes.as_str());
        }
        suite
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the test identifiers found under a scripts directory
    Discover {
        #[command(flatten)]
        suite: SuiteArgs,
    },

    /// Run script tests through the execution bridge
    Run {
        #[command(flatten)]
        suite: SuiteArgs,
        /// Interpreter launched for each test
        #[arg(long, value_name = "PROG")]
        interpreter: String,
        /// Interpreter arguments; `{script}` and `{function}` are substituted
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
        /// Stop on first failure
        #[arg(short = 'x', long = "exitfirst")]
        stop_on_fail: bool,
        /// Filter tests by keyword expression
        #[arg(short = 'k', value_name = "EXPR")]
        keyword: Option<String>,
        /// Per-wait timeout in seconds (overrides configuration)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Discover { suite } => commands::discover(&suite.suite_info()),
        Command::Run {
            suite,
            interpreter,
            args,
            verbose,
            stop_on_fail,
            keyword,
            timeout,
        } => commands::run_scripts(
            &suite.suite_info(),
            &interpreter,
            &args,
            RunOptions { keyword, stop_on_fail },
            verbose,
            timeout,
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_discover() {
        let cli = Cli::try_parse_from(["worker-harness", "discover", "--root", "scripts"]).unwrap();
        let Command::Discover { suite } = cli.command else {
            panic!("Expected Discover command");
        };
        let info = suite.suite_info();
        assert_eq!(info.scripts_directory, PathBuf::from("scripts"));
        assert_eq!(info.filename_filter, crate::config::DEFAULT_FILENAME_FILTER);
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from([
            "worker-harness",
            "run",
            "--root",
            "scripts",
            "--filter",
            r".+_test\.sh",
            "--interpreter",
            "sh",
            "-v",
            "-x",
            "-k",
            "cache",
            "--timeout",
            "30",
            "--",
            "runner.sh",
            "{script}",
            "{function}",
        ])
        .unwrap();
        let Command::Run {
            suite,
            interpreter,
            args,
            verbose,
            stop_on_fail,
            keyword,
            timeout,
        } = cli.command
        else {
            panic!("Expected Run command");
        };
        assert_eq!(suite.filter.as_deref(), Some(r".+_test\.sh"));
        assert_eq!(interpreter, "sh");
        assert_eq!(args, ["runner.sh", "{script}", "{function}"]);
        assert!(verbose && stop_on_fail);
        assert_eq!(keyword.as_deref(), Some("cache"));
        assert_eq!(timeout, Some(30));
    }

    #[test]
    fn test_cli_run_requires_interpreter() {
        assert!(Cli::try_parse_from(["worker-harness", "run", "--root", "s"]).is_err());
    }
}
