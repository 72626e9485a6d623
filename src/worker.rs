//! Worker invocation harness.
//!
//! A worker unit is a type implementing [`TestWorker`]: it can be created from a [`WorkerContext`] and exposes a
//! [`MethodTable`] mapping method names to functions. The platform never calls test methods directly; it goes
//! through [`run_method`], which guarantees that exactly one completion message is published for the run no
//! matter how the method ends (return, error, panic or unknown name).

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};

use harness_core::FailureCapsule;

use crate::platform::WorkerContext;

/// How a test method signals that its scenario is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// The test is complete when the method returns (unless it already failed or completed).
    #[default]
    OnReturn,
    /// The test is complete only when the worker calls `test_complete()` or a failure is published.
    Explicit,
}

/// A test method ended with an error value instead of returning normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodError {
    pub type_name: String,
    pub message: String,
}

impl MethodError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    fn into_capsule(self) -> FailureCapsule {
        FailureCapsule::error(self.type_name, self.message)
    }
}

pub type MethodResult = Result<(), MethodError>;

/// Return types a test method may have.
pub trait MethodReturn {
    fn into_method_result(self) -> MethodResult;
}

impl MethodReturn for () {
    fn into_method_result(self) -> MethodResult {
        Ok(())
    }
}

impl<E: Display> MethodReturn for Result<(), E> {
    fn into_method_result(self) -> MethodResult {
        self.map_err(|err| MethodError::new(std::any::type_name::<E>(), err.to_string()))
    }
}

pub type MethodFn<W> = fn(&mut W, &WorkerContext) -> MethodResult;

/// One named test method of a worker.
pub struct MethodEntry<W> {
    name: String,
    completion: Completion,
    call: MethodFn<W>,
}

impl<W> MethodEntry<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }
}

/// Ordered name → method registry of a worker type, built once per type.
pub struct MethodTable<W> {
    entries: Vec<MethodEntry<W>>,
}

impl<W> Default for MethodTable<W> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<W> MethodTable<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method. Declaration order is preserved; if a name repeats, the first entry wins on lookup.
    pub fn with(mut self, name: impl Into<String>, completion: Completion, call: MethodFn<W>) -> Self {
        self.entries.push(MethodEntry {
            name: name.into(),
            completion,
            call,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&MethodEntry<W>> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A type whose instances can be deployed as worker units to run test methods.
///
/// Usually implemented with `#[test_worker]`.
pub trait TestWorker: Sized {
    /// Name the unit is registered and deployed under.
    fn unit_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn create(ctx: &WorkerContext) -> Self;

    fn methods() -> MethodTable<Self>;

    /// Runs when the unit is deployed, before the selected method.
    fn start(&mut self, _ctx: &WorkerContext) {}

    /// Runs when the unit is undeployed.
    fn stop(&mut self, _ctx: &WorkerContext) {}
}

/// Type-erased deployed worker, as the platform drives it.
pub trait WorkerInstance: Send {
    fn start(&mut self, ctx: &WorkerContext);

    /// Run the method selected by the context's configuration.
    fn run(&mut self, ctx: &WorkerContext);

    fn stop(&mut self, ctx: &WorkerContext);
}

/// Adapter from a [`TestWorker`] to a [`WorkerInstance`].
pub struct Deployed<W>(pub W);

impl<W: TestWorker + Send> WorkerInstance for Deployed<W> {
    fn start(&mut self, ctx: &WorkerContext) {
        self.0.start(ctx);
    }

    fn run(&mut self, ctx: &WorkerContext) {
        run_method(&mut self.0, ctx);
    }

    fn stop(&mut self, ctx: &WorkerContext) {
        self.0.stop(ctx);
    }
}

/// Invoke the method named in the worker's configuration and publish its completion.
///
/// ## Behaviour
/// - No `methodName` or an unknown name: an `Error` failure is published.
/// - The method panics: a `Panic` failure is published.
/// - The method returns `Err`: an `Error` failure is published.
/// - The method returns normally in [`Completion::OnReturn`] mode: `done` is published.
///
/// Nothing is published if the method already signalled (through an assertion or `test_complete()`).
pub fn run_method<W: TestWorker>(worker: &mut W, ctx: &WorkerContext) {
    let asserter = ctx.asserter();
    let Some(name) = ctx.method_name() else {
        asserter.handle_failure(FailureCapsule::error(
            "MissingMethodName",
            "worker configuration does not name a test method",
        ));
        return;
    };
    let table = W::methods();
    let Some(entry) = table.get(name) else {
        asserter.handle_failure(FailureCapsule::error(
            "UnknownMethod",
            format!("`{}` has no test method named `{name}`", W::unit_name()),
        ));
        return;
    };

    tracing::debug!(unit = W::unit_name(), method = name, "invoking test method");
    let outcome = catch_unwind(AssertUnwindSafe(|| (entry.call)(worker, ctx)));
    let already_signalled = asserter.has_signalled();
    match outcome {
        Ok(Ok(())) => {
            if entry.completion == Completion::OnReturn && !already_signalled {
                asserter.test_complete();
            }
        }
        Ok(Err(err)) if !already_signalled => asserter.handle_failure(err.into_capsule()),
        Err(payload) if !already_signalled => asserter.handle_panic(payload.as_ref()),
        Ok(Err(err)) => tracing::debug!(method = name, error = %err.message, "error after completion ignored"),
        Err(_) => tracing::debug!(method = name, "panic after completion ignored"),
    }
}
