//! The remote assertion facade.
//!
//! Code running inside a worker asserts through an [`Asserter`]. A failing check does not unwind the worker's
//! stack: the failure is packed into a [`FailureCapsule`], published as the test's completion message, and the
//! call returns normally so the worker can keep cleaning up.
//!
//! ```ignore
//! use harness_assert::Assertions;
//!
//! fn test_sum(ctx: &WorkerContext) {
//!     let a = ctx.asserter();
//!     a.assert_eq(4, 2 + 2);
//!     a.with_message("totals").assert_true(ledger.balanced());
//! }
//! ```

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::{Debug, Display};
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use harness_core::{CompletionMessage, CompletionSink, FailureCapsule};

use crate::compare::{self, Check};
use crate::errors::{FacadeError, raise};
use crate::matcher::Matcher;

#[derive(Default)]
struct Shared {
    sink: OnceLock<Arc<dyn CompletionSink>>,
    signalled: AtomicBool,
}

/// Handle through which worker code asserts and signals completion.
///
/// Cloning is cheap; every clone shares the same binding and completion state.
#[derive(Clone, Default)]
pub struct Asserter {
    shared: Arc<Shared>,
}

impl Debug for Asserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asserter")
            .field("bound", &self.is_bound())
            .field("signalled", &self.has_signalled())
            .finish()
    }
}

impl Asserter {
    /// Create an unbound facade. Any assertion made before [`Asserter::bind`] is a configuration error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a facade already bound to `sink`.
    pub fn bound(sink: Arc<dyn CompletionSink>) -> Self {
        let asserter = Self::new();
        // A fresh facade has no sink yet.
        let _ = asserter.shared.sink.set(sink);
        asserter
    }

    /// Bind the facade to the sink that receives its completion message.
    pub fn bind(&self, sink: Arc<dyn CompletionSink>) -> Result<(), FacadeError> {
        self.shared.sink.set(sink).map_err(|_| FacadeError::AlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.shared.sink.get().is_some()
    }

    /// Whether a completion message (`done` or `failure`) has been published.
    pub fn has_signalled(&self) -> bool {
        self.shared.signalled.load(Ordering::Acquire)
    }

    #[track_caller]
    fn sink(&self) -> &Arc<dyn CompletionSink> {
        match self.shared.sink.get() {
            Some(sink) => sink,
            None => raise(FacadeError::Unbound),
        }
    }

    fn publish(&self, message: CompletionMessage) {
        let sink = self.sink();
        self.shared.signalled.store(true, Ordering::Release);
        sink.publish(message);
    }

    /// Signal that an asynchronous test scenario finished successfully.
    #[track_caller]
    pub fn test_complete(&self) {
        self.publish(CompletionMessage::Done);
    }

    /// Publish a captured failure as this test's completion message.
    #[track_caller]
    pub fn handle_failure(&self, capsule: FailureCapsule) {
        self.publish(CompletionMessage::failure(&capsule));
    }

    /// Capture a panic payload that escaped worker code.
    pub fn handle_panic(&self, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        self.handle_failure(FailureCapsule::panic(message).with_trace(captured_backtrace()));
    }

    /// Capture an error value returned by worker code.
    pub fn handle_error(&self, type_name: &str, err: &dyn Display) {
        self.handle_failure(FailureCapsule::error(type_name, err.to_string()).with_trace(captured_backtrace()));
    }

    /// Route the result of a comparison: failures become completion messages, successes are silent.
    #[track_caller]
    pub fn route(&self, check: Check) {
        // Binding is checked even for passing checks so a miswired worker fails on its first assertion.
        self.sink();
        if let Err(failure) = check {
            let location = Location::caller();
            let mut trace = vec![location.to_string()];
            trace.extend(captured_backtrace());
            self.handle_failure(FailureCapsule::assertion(failure.message).with_trace(trace));
        }
    }

    /// Prefix every failure message of the returned scope with `message`.
    pub fn with_message<'a>(&'a self, message: &'a str) -> Labeled<'a> {
        Labeled { asserter: self, message }
    }
}

/// Extract the human-readable part of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

fn captured_backtrace() -> Vec<String> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    backtrace
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// The assertion surface shared by [`Asserter`] and [`Labeled`].
pub trait Assertions {
    fn asserter(&self) -> &Asserter;

    /// Message prepended to failures raised through this scope.
    fn label(&self) -> Option<&str> {
        None
    }

    #[track_caller]
    fn assert_true(&self, condition: bool) {
        self.asserter().route(compare::is_true(self.label(), condition));
    }

    #[track_caller]
    fn assert_false(&self, condition: bool) {
        self.asserter().route(compare::is_false(self.label(), condition));
    }

    #[track_caller]
    fn fail(&self) {
        self.asserter().route(compare::fail(self.label()));
    }

    #[track_caller]
    fn assert_eq<T: PartialEq + Debug>(&self, expected: T, actual: T) {
        self.asserter().route(compare::equals(self.label(), &expected, &actual));
    }

    #[track_caller]
    fn assert_ne<T: PartialEq + Debug>(&self, unexpected: T, actual: T) {
        self.asserter().route(compare::not_equals(self.label(), &unexpected, &actual));
    }

    #[track_caller]
    fn assert_approx_eq(&self, expected: f64, actual: f64, delta: f64) {
        self.asserter().route(compare::approx_equals(self.label(), expected, actual, delta));
    }

    #[track_caller]
    fn assert_same<T: Debug + ?Sized>(&self, expected: &T, actual: &T) {
        self.asserter().route(compare::same(self.label(), expected, actual));
    }

    #[track_caller]
    fn assert_not_same<T: ?Sized>(&self, unexpected: &T, actual: &T) {
        self.asserter().route(compare::not_same(self.label(), unexpected, actual));
    }

    #[track_caller]
    fn assert_none<T: Debug>(&self, value: &Option<T>) {
        self.asserter().route(compare::is_none(self.label(), value));
    }

    #[track_caller]
    fn assert_some<T>(&self, value: &Option<T>) {
        self.asserter().route(compare::is_some(self.label(), value));
    }

    #[track_caller]
    fn assert_slice_eq<T: PartialEq + Debug>(&self, expected: &[T], actual: &[T]) {
        self.asserter().route(compare::array_equals(self.label(), expected, actual));
    }

    #[track_caller]
    fn assert_slice_approx_eq(&self, expected: &[f64], actual: &[f64], delta: f64) {
        self.asserter()
            .route(compare::array_approx_equals(self.label(), expected, actual, delta));
    }

    #[track_caller]
    fn assert_that<T: Debug + ?Sized, M: Matcher<T>>(&self, actual: &T, matcher: M) {
        self.asserter().route(compare::that(self.label(), actual, &matcher));
    }
}

impl Assertions for Asserter {
    fn asserter(&self) -> &Asserter {
        self
    }
}

/// An assertion scope whose failures carry a caller-supplied message.
pub struct Labeled<'a> {
    asserter: &'a Asserter,
    message: &'a str,
}

impl Assertions for Labeled<'_> {
    fn asserter(&self) -> &Asserter {
        self.asserter
    }

    fn label(&self) -> Option<&str> {
        Some(self.message)
    }
}
