//! Provide the wire vocabulary shared by the execution bridge and the code running inside a worker.
//!
//! Both sides of the bridge agree on three things and nothing else:
//! - the well-known address the worker publishes its completion on,
//! - the shape of the single completion message (`done` or `failure`), and
//! - the versioned encoding of a captured failure (the "capsule").
//!
//! ## Notes
//!
//! - This is a "vocabulary" crate: **no IO**, no global state, and no runtime types. The bridge and the
//!   facade only meet through [`CompletionSink`].

pub mod capsule;
pub mod message;

pub use capsule::{CAPSULE_VERSION, CapsuleError, FailureCapsule, FailureKind};
pub use message::{CompletionMessage, MessageError};

/// Address on which a worker publishes its completion message.
///
/// Shared process-wide; the bridge subscribes to it for exactly one test at a time.
pub const COMPLETION_ADDRESS: &str = "worker_harness.testframework.handler";

/// Key in the worker configuration that selects the test method to run.
pub const METHOD_NAME_KEY: &str = "methodName";

/// Key carrying the per-test correlation token.
///
/// The bridge puts a fresh token in each worker configuration; the worker's sink copies it into every
/// completion body so the bridge can drop messages left over from an earlier, abandoned test.
pub const COMPLETION_TOKEN_KEY: &str = "completionToken";

/// Key in the worker configuration holding the static suite properties.
pub const PROPERTIES_KEY: &str = "properties";

/// Destination for the completion message of one test execution.
///
/// The facade running inside a worker owns one of these; the runtime decides where messages actually go.
pub trait CompletionSink: Send + Sync {
    /// Publish a completion message. Delivery is fire-and-forget.
    fn publish(&self, message: CompletionMessage);
}
