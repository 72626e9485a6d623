#![forbid(unsafe_code)]
//! Worker harness: run test methods inside isolated, asynchronously managed workers and report them as if they
//! had run on the calling thread.
//!
//! The calling thread never sees inside a worker. The only way back is a single completion message on a
//! well-known bus address: `done`, or `failure` carrying an encoded failure capsule. The
//! [`ExecutionBridge`] turns that asynchronous exchange into an ordinary blocking call with timeouts.
//!
//! ## Layout
//!
//! - [`bridge`]: the execution bridge and test verdicts
//! - [`bus`] / [`latch`]: the completion channel and the one-shot wait primitive
//! - [`platform`]: deploying and undeploying workers ([`LocalPlatform`] runs them on tokio)
//! - [`worker`] / [`catalog`] / [`script`]: the in-worker invocation harness and the deployable units
//! - [`discovery`]: reflective and pattern-based method enumeration
//! - [`runner`]: the run loop and reporters
//! - [`config`] / [`cli`]: configuration and the `worker-harness` binary
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//! - **Facade misuse**: asserting through an unbound facade panics on the spot; it is a wiring bug, not a test
//!   failure.
//!
//! ## Example
//! ```ignore
//! use worker_harness::prelude::*;
//!
//! #[derive(Default)]
//! struct Arithmetic;
//!
//! #[test_worker]
//! impl Arithmetic {
//!     #[test_method]
//!     fn test_sum(&mut self, ctx: &WorkerContext) {
//!         ctx.asserter().assert_eq(4, 2 + 2);
//!     }
//! }
//!
//! #[test]
//! fn arithmetic_in_worker() {
//!     let platform = LocalPlatform::new(WorkerCatalog::new().with_worker::<Arithmetic>()).unwrap();
//!     let enumerator = ReflectiveEnumerator::of::<Arithmetic>();
//!     let bridge = ExecutionBridge::new(Arc::new(platform), Arc::new(enumerator.resolver()), HarnessConfig::default());
//!     bridge.run_test("test_sum").raise();
//! }
//! ```

// Lets `#[test_worker]` output, which names `::worker_harness`, compile inside this crate too.
extern crate self as worker_harness;

pub mod bridge;
pub mod bus;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod latch;
pub mod platform;
pub mod runner;
pub mod script;
pub mod worker;

pub use bridge::{BridgeError, ExecutionBridge, RemoteFailure, TestOutcome};
pub use bus::{BusSink, EventBus, Subscription};
pub use catalog::WorkerCatalog;
pub use config::{ConfigError, HarnessConfig, SuiteInfo};
pub use discovery::{
    DiscoveryError, IdentityResolver, MethodEnumerator, MethodResolver, PatternEnumerator, ReflectiveEnumerator,
    ScriptResolver, Target,
};
pub use latch::{Latch, TimedOut};
pub use platform::{
    DeployRequest, DeploymentId, LocalPlatform, Platform, PlatformError, WorkerConfig, WorkerContext,
};
pub use runner::{ConsoleReporter, RecordingReporter, ReportEvent, RunOptions, Runner, TestReporter, TestSummary};
pub use script::{CommandScriptHost, ScriptError, ScriptHost};
pub use worker::{Completion, MethodError, MethodResult, MethodReturn, MethodTable, TestWorker};

pub use harness_assert::{self as assert, Asserter, Assertions, FacadeError};
pub use harness_core::{
    self as wire, COMPLETION_ADDRESS, COMPLETION_TOKEN_KEY, CompletionMessage, FailureCapsule, FailureKind,
};
pub use harness_derive::test_worker;

/// Everything a worker test file usually needs.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        Asserter, Assertions, Completion, ExecutionBridge, HarnessConfig, LocalPlatform, MethodResult,
        ReflectiveEnumerator, TestOutcome, TestWorker, WorkerCatalog, WorkerContext, test_worker,
    };
    pub use harness_assert::{equal_to, greater_than, less_than, not, predicate};
}
