//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::ExecutionBridge;
use crate::catalog::WorkerCatalog;
use crate::config::{HarnessConfig, SuiteInfo};
use crate::discovery::{DiscoveryError, MethodEnumerator, PatternEnumerator, ScriptResolver};
use crate::platform::LocalPlatform;
use crate::runner::{ConsoleReporter, RunOptions, Runner};
use crate::script::CommandScriptHost;

use super::{CliError, CliResult, ExitCode};

fn discovery_error(err: DiscoveryError) -> CliError {
    CliError::setup(format!("{:?}", miette::Report::new(err)))
}

/// Print the identifiers of every script test under the suite's root.
pub fn discover(suite: &SuiteInfo) -> CliResult<ExitCode> {
    let enumerator = PatternEnumerator::new(suite).map_err(discovery_error)?;
    let identifiers = enumerator.enumerate().map_err(discovery_error)?;
    for identifier in &identifiers {
        println!("{identifier}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Run every script test under the suite's root through a local platform.
pub fn run_scripts(
    suite: &SuiteInfo,
    interpreter: &str,
    args: &[String],
    options: RunOptions,
    verbose: bool,
    timeout: Option<u64>,
) -> CliResult<ExitCode> {
    let mut config = HarnessConfig::from_environment().map_err(|e| CliError::setup(e.to_string()))?;
    if let Some(secs) = timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    tracing::debug!(timeout = ?config.timeout, module = ?config.module_name, "harness configured");

    let enumerator = PatternEnumerator::new(suite).map_err(discovery_error)?;
    let host = CommandScriptHost::new(&suite.scripts_directory, interpreter).with_args(args.iter().cloned());
    let catalog = WorkerCatalog::new().with_scripts(&suite.scripts_directory, Arc::new(host));
    let platform = LocalPlatform::new(catalog).map_err(|e| CliError::setup(e.to_string()))?;

    let bridge = ExecutionBridge::new(Arc::new(platform), Arc::new(ScriptResolver), config)
        .with_includes(suite.includes.clone());
    let mut reporter = ConsoleReporter::new(verbose);
    let summary = Runner::new(&bridge, options)
        .run(&enumerator, &mut reporter)
        .map_err(discovery_error)?;

    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        // Summary already printed
        Err(CliError::failure(""))
    }
}
