//! Run loop and notification sink (pytest-style).
//!
//! ## TestReporter Trait
//!
//! The runner reports through the `TestReporter` trait so output formats stay separate from execution.
//! Every test produces exactly one start and one completion notification; the completion carries the
//! re-raised remote failure (or the harness error) as its cause.
//!
//! ## Failure policy
//!
//! Discovery errors abort the run before any test starts. Anything that goes wrong while running one test is
//! reported as that test's failure and the loop moves on.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::bridge::{ExecutionBridge, TestOutcome};
use crate::discovery::{DiscoveryError, MethodEnumerator};

/// Trait for reporting test execution results.
pub trait TestReporter {
    /// Called once discovery produced the (filtered) list of tests.
    fn on_collection_complete(&mut self, test_count: usize);

    fn on_test_start(&mut self, identifier: &str);

    fn on_test_complete(&mut self, identifier: &str, outcome: &TestOutcome, duration: Duration);

    fn on_run_complete(&mut self, summary: &TestSummary);
}

/// Summary of a test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Tests whose verdict is unknown because the harness malfunctioned.
    pub aborted: usize,
    /// Tests removed by the keyword filter.
    pub deselected: usize,
    pub duration: Duration,
}

impl TestSummary {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only run tests whose identifier contains this substring.
    pub keyword: Option<String>,
    /// Stop after the first failed or aborted test.
    pub stop_on_fail: bool,
}

pub struct Runner<'a> {
    bridge: &'a ExecutionBridge,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    pub fn new(bridge: &'a ExecutionBridge, options: RunOptions) -> Self {
        Self { bridge, options }
    }

    /// Enumerate tests and run them one at a time through the bridge.
    pub fn run(
        &self,
        enumerator: &dyn MethodEnumerator,
        reporter: &mut dyn TestReporter,
    ) -> Result<TestSummary, DiscoveryError> {
        let start_time = Instant::now();
        let discovered = enumerator.enumerate()?;
        let total_discovered = discovered.len();
        let selected: Vec<String> = discovered
            .into_iter()
            .filter(|id| self.options.keyword.as_deref().is_none_or(|k| id.contains(k)))
            .collect();

        let mut summary = TestSummary {
            total: selected.len(),
            deselected: total_discovered - selected.len(),
            ..TestSummary::default()
        };
        reporter.on_collection_complete(selected.len());

        for identifier in &selected {
            reporter.on_test_start(identifier);
            let started = Instant::now();
            let outcome = self.bridge.run_test(identifier);
            reporter.on_test_complete(identifier, &outcome, started.elapsed());
            match outcome {
                TestOutcome::Passed => summary.passed += 1,
                TestOutcome::Failed(_) => summary.failed += 1,
                TestOutcome::Aborted(_) => summary.aborted += 1,
            }
            if self.options.stop_on_fail && !summary.success() {
                tracing::info!(%identifier, "stopping after first failure");
                break;
            }
        }

        summary.duration = start_time.elapsed();
        reporter.on_run_complete(&summary);
        Ok(summary)
    }
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Default console reporter (pytest-style).
pub struct ConsoleReporter<W: Write = io::Stderr> {
    out: W,
    verbose: bool,
    color: bool,
    failures: Vec<(String, String)>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(io::stderr(), verbose, true)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, verbose: bool, color: bool) -> Self {
        Self {
            out,
            verbose,
            color,
            failures: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    // Console output is best effort; a closed stderr must not fail the run.
    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> TestReporter for ConsoleReporter<W> {
    fn on_collection_complete(&mut self, test_count: usize) {
        let header = self.paint(BOLD, "=================== test session starts ===================");
        self.emit(&format!("{header}\ncollected {test_count} item(s)\n\n"));
    }

    fn on_test_start(&mut self, identifier: &str) {
        if self.verbose {
            self.emit(&format!("{identifier} ... "));
        }
    }

    fn on_test_complete(&mut self, identifier: &str, outcome: &TestOutcome, duration: Duration) {
        let (color, long, short) = match outcome {
            TestOutcome::Passed => (GREEN, "PASSED", "."),
            TestOutcome::Failed(_) => (RED, "FAILED", "F"),
            TestOutcome::Aborted(_) => (YELLOW, "ERROR", "E"),
        };
        let status = if self.verbose {
            format!("{} ({}ms)\n", self.paint(color, long), duration.as_millis())
        } else {
            self.paint(color, short)
        };
        self.emit(&status);
        if let Some(text) = outcome.failure_text() {
            self.failures.push((identifier.to_string(), text));
        }
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        let mut text = String::new();
        if !self.verbose {
            text.push('\n');
        }
        if !self.failures.is_empty() {
            text.push('\n');
            text.push_str(&self.paint(RED, "=================== FAILURES ==================="));
            text.push('\n');
            for (identifier, failure) in &self.failures {
                text.push_str(&format!("\n___________ {identifier} ___________\n\n"));
                for line in failure.lines() {
                    text.push_str(&format!("    {line}\n"));
                }
            }
        }

        let mut parts = Vec::new();
        if summary.passed > 0 {
            parts.push(format!("{} passed", summary.passed));
        }
        if summary.failed > 0 {
            parts.push(format!("{} failed", summary.failed));
        }
        if summary.aborted > 0 {
            parts.push(format!("{} error", summary.aborted));
        }
        if summary.deselected > 0 {
            parts.push(format!("{} deselected", summary.deselected));
        }
        if parts.is_empty() {
            parts.push("no tests ran".to_string());
        }
        let color = if summary.success() { GREEN } else { RED };
        let line = format!(
            "=================== {} in {:.2}s ===================",
            parts.join(", "),
            summary.duration.as_secs_f64()
        );
        text.push('\n');
        text.push_str(&self.paint(color, &line));
        text.push('\n');
        self.emit(&text);
    }
}

/// One notification received by a [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Collected(usize),
    Started(String),
    Passed(String),
    Failed { identifier: String, cause: String },
    Aborted { identifier: String, cause: String },
    Finished { passed: usize, failed: usize, aborted: usize },
}

/// Reporter that records every notification, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<ReportEvent>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of the tests that completed, in completion order.
    pub fn completed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Passed(id) => Some(id.as_str()),
                ReportEvent::Failed { identifier, .. } | ReportEvent::Aborted { identifier, .. } => {
                    Some(identifier.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

impl TestReporter for RecordingReporter {
    fn on_collection_complete(&mut self, test_count: usize) {
        self.events.push(ReportEvent::Collected(test_count));
    }

    fn on_test_start(&mut self, identifier: &str) {
        self.events.push(ReportEvent::Started(identifier.to_string()));
    }

    fn on_test_complete(&mut self, identifier: &str, outcome: &TestOutcome, _duration: Duration) {
        let identifier = identifier.to_string();
        let event = match outcome {
            TestOutcome::Passed => ReportEvent::Passed(identifier),
            TestOutcome::Failed(failure) => ReportEvent::Failed {
                identifier,
                cause: failure.to_string(),
            },
            TestOutcome::Aborted(err) => ReportEvent::Aborted {
                identifier,
                cause: err.to_string(),
            },
        };
        self.events.push(event);
    }

    fn on_run_complete(&mut self, summary: &TestSummary) {
        self.events.push(ReportEvent::Finished {
            passed: summary.passed,
            failed: summary.failed,
            aborted: summary.aborted,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeError, RemoteFailure};
    use harness_core::FailureCapsule;

    fn feed(reporter: &mut dyn TestReporter) {
        reporter.on_collection_complete(3);
        reporter.on_test_start("a.js.testOk");
        reporter.on_test_complete("a.js.testOk", &TestOutcome::Passed, Duration::from_millis(3));
        reporter.on_test_start("a.js.testBad");
        let failure = RemoteFailure(FailureCapsule::assertion(Some("expected:<1> but was:<2>".into())));
        reporter.on_test_complete("a.js.testBad", &TestOutcome::Failed(failure), Duration::from_millis(4));
        reporter.on_test_start("b.js.testSlow");
        let aborted = TestOutcome::Aborted(BridgeError::CompletionTimeout(Duration::from_secs(300)));
        reporter.on_test_complete("b.js.testSlow", &aborted, Duration::from_millis(5));
        reporter.on_run_complete(&TestSummary {
            total: 3,
            passed: 1,
            failed: 1,
            aborted: 1,
            deselected: 0,
            duration: Duration::ZERO,
        });
    }

    #[test]
    fn test_console_reporter_output() {
        let mut reporter = ConsoleReporter::with_writer(Vec::new(), false, false);
        feed(&mut reporter);
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        insta::assert_snapshot!(output, @r"
        =================== test session starts ===================
        collected 3 item(s)

        .FE

        =================== FAILURES ===================

        ___________ a.js.testBad ___________

            AssertionFailed: expected:<1> but was:<2>

        ___________ b.js.testSlow ___________

            harness error: timed out after 300s waiting for the test to complete

        =================== 1 passed, 1 failed, 1 error in 0.00s ===================
        ");
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let mut reporter = RecordingReporter::new();
        feed(&mut reporter);
        assert_eq!(reporter.completed(), ["a.js.testOk", "a.js.testBad", "b.js.testSlow"]);
        assert_eq!(reporter.events.first(), Some(&ReportEvent::Collected(3)));
        assert_eq!(
            reporter.events.last(),
            Some(&ReportEvent::Finished {
                passed: 1,
                failed: 1,
                aborted: 1
            })
        );
    }

    #[test]
    fn test_summary_success() {
        assert!(TestSummary::default().success());
        assert!(
            !TestSummary {
                aborted: 1,
                ..TestSummary::default()
            }
            .success()
        );
    }
}
