//! Failure capsules: a transportable, self-describing form of a test failure.
//!
//! A capsule is produced inside a worker and decoded in the calling thread. The two sides share no memory, so
//! the capsule carries only plain data: a classification, an optional message, the name of the failure type and
//! a list of trace lines.
//!
//! ## Encoding
//!
//! The byte form is a JSON document with an explicit version field:
//!
//! ```text
//! {"v":1,"kind":"assertion","message":"expected:<1> but was:<2>","type_name":"AssertionFailed","trace":[...]}
//! ```
//!
//! Decoding checks the version before anything else, so a future layout is rejected with
//! [`CapsuleError::UnsupportedVersion`] rather than misread.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current capsule layout version.
pub const CAPSULE_VERSION: u32 = 1;

/// Classification of a captured failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// An assertion in the comparison library did not hold.
    Assertion,
    /// Worker code panicked outside of an assertion.
    Panic,
    /// The test method returned an error, or could not be invoked at all.
    Error,
}

impl FailureKind {
    /// Type name used when the producer does not supply a more specific one.
    pub fn default_type_name(self) -> &'static str {
        match self {
            FailureKind::Assertion => "AssertionFailed",
            FailureKind::Panic => "Panic",
            FailureKind::Error => "Error",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Assertion => "assertion",
            FailureKind::Panic => "panic",
            FailureKind::Error => "error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning bytes back into a capsule.
#[derive(Debug, Error)]
pub enum CapsuleError {
    #[error("failure capsule is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failure capsule version {0} is not supported (expected {CAPSULE_VERSION})")]
    UnsupportedVersion(u32),
}

/// A captured failure, independent of the context that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCapsule {
    kind: FailureKind,
    message: Option<String>,
    type_name: String,
    trace: Vec<String>,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    v: u32,
    kind: FailureKind,
    message: Option<&'a str>,
    type_name: &'a str,
    trace: &'a [String],
}

#[derive(Deserialize)]
struct Record {
    kind: FailureKind,
    #[serde(default)]
    message: Option<String>,
    type_name: String,
    #[serde(default)]
    trace: Vec<String>,
}

#[derive(Deserialize)]
struct VersionHeader {
    v: u32,
}

impl FailureCapsule {
    /// Create a capsule of the given kind, using the kind's default type name.
    pub fn new(kind: FailureKind, message: Option<String>) -> Self {
        Self {
            kind,
            message,
            type_name: kind.default_type_name().to_string(),
            trace: Vec::new(),
        }
    }

    /// Create a capsule for a failed assertion.
    pub fn assertion(message: Option<String>) -> Self {
        Self::new(FailureKind::Assertion, message)
    }

    /// Create a capsule for a panic that escaped worker code.
    pub fn panic(message: Option<String>) -> Self {
        Self::new(FailureKind::Panic, message)
    }

    /// Create a capsule for an error value returned by worker code.
    pub fn error(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            message: Some(message.into()),
            type_name: type_name.into(),
            trace: Vec::new(),
        }
    }

    /// Replace the type name carried by the capsule.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Append trace lines (outermost first).
    pub fn with_trace<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trace.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Encode the capsule into its versioned byte form.
    pub fn encode(&self) -> Vec<u8> {
        let record = RecordRef {
            v: CAPSULE_VERSION,
            kind: self.kind,
            message: self.message.as_deref(),
            type_name: &self.type_name,
            trace: &self.trace,
        };
        // Serializing plain strings and integers into a Vec cannot fail.
        serde_json::to_vec(&record).unwrap_or_default()
    }

    /// Decode a capsule previously produced by [`FailureCapsule::encode`].
    ///
    /// ## Errors
    /// - [`CapsuleError::Malformed`] when the bytes are not a capsule document.
    /// - [`CapsuleError::UnsupportedVersion`] when the document was written by an incompatible layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, CapsuleError> {
        let header: VersionHeader = serde_json::from_slice(bytes)?;
        if header.v != CAPSULE_VERSION {
            return Err(CapsuleError::UnsupportedVersion(header.v));
        }
        let record: Record = serde_json::from_slice(bytes)?;
        Ok(Self {
            kind: record.kind,
            message: record.message,
            type_name: record.type_name,
            trace: record.trace,
        })
    }

    /// Render the capsule the way a failure report shows it: header line followed by indented trace lines.
    pub fn render(&self) -> String {
        let mut out = self.to_string();
        for line in &self.trace {
            out.push_str("\n    at ");
            out.push_str(line);
        }
        out
    }
}

impl fmt::Display for FailureCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => f.write_str(&self.type_name),
        }
    }
}
