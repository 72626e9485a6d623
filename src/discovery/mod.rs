//! Method enumeration: which tests exist, and how each identifier maps onto a deployable worker.
//!
//! Two variants:
//! - [`ReflectiveEnumerator`]: the test methods a registered worker type declares.
//! - [`PatternEnumerator`]: test functions found by scanning script files under a directory.
//!
//! Each variant comes with its [`MethodResolver`], which turns an identifier back into a [`Target`].

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub mod pattern;
pub mod reflective;

pub use pattern::{PatternEnumerator, ScriptResolver};
pub use reflective::{IdentityResolver, ReflectiveEnumerator};

/// The worker unit to deploy and the method it should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub unit: String,
    pub method: String,
}

impl Target {
    pub fn new(unit: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            method: method.into(),
        }
    }
}

/// Produces the ordered, duplicate-free list of method identifiers for one run.
pub trait MethodEnumerator {
    fn enumerate(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Maps a method identifier onto the worker unit and actual method name.
pub trait MethodResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Option<Target>;
}

/// Errors raised before any test runs. They abort the whole run.
#[derive(Debug, Error, Diagnostic)]
pub enum DiscoveryError {
    #[error("`{0}` is not a registered test worker")]
    #[diagnostic(
        code(discovery::not_a_test_worker),
        help("mark the type's impl block with #[test_worker] and register it with `WorkerCatalog::with_worker`")
    )]
    NotATestWorker(String),

    #[error("test worker `{0}` declares no test methods")]
    #[diagnostic(code(discovery::no_test_methods), help("mark at least one method with #[test_method]"))]
    NoTestMethods(String),

    #[error("scripts directory `{}` does not exist", .0.display())]
    #[diagnostic(code(discovery::missing_root), help("paths are resolved relative to the working directory"))]
    MissingRoot(PathBuf),

    #[error("no files under `{}` match the filename filter `{filter}`", root.display())]
    #[diagnostic(
        code(discovery::no_files),
        help("the filter is matched against whole base names, e.g. `.+_test\\.js`")
    )]
    NoFiles { root: PathBuf, filter: String },

    #[error("no test functions matching `{pattern}` in {files} file(s) under `{}`", root.display())]
    #[diagnostic(
        code(discovery::no_methods),
        help("the first capture group of the function pattern must capture the function name")
    )]
    NoMethods { root: PathBuf, pattern: String, files: usize },

    #[error("invalid {what} pattern `{pattern}`")]
    #[diagnostic(code(discovery::invalid_pattern))]
    InvalidPattern {
        what: &'static str,
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("failed to read `{}`", path.display())]
    #[diagnostic(code(discovery::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
