//! The completion message a worker publishes exactly once per test execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capsule::{CapsuleError, FailureCapsule};

/// Terminal signal for the test logic running inside a worker.
///
/// Wire form is internally tagged on `type`:
/// - `{"type":"done"}`
/// - `{"type":"failure","failure":[...capsule bytes...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CompletionMessage {
    Done,
    Failure { failure: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("completion message is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl CompletionMessage {
    /// Build a `failure` message carrying the encoded capsule.
    pub fn failure(capsule: &FailureCapsule) -> Self {
        CompletionMessage::Failure {
            failure: capsule.encode(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CompletionMessage::Done)
    }

    /// Decode the carried capsule, if this is a `failure` message.
    pub fn capsule(&self) -> Option<Result<FailureCapsule, CapsuleError>> {
        match self {
            CompletionMessage::Done => None,
            CompletionMessage::Failure { failure } => Some(FailureCapsule::decode(failure)),
        }
    }

    /// Convert into the JSON body carried on the bus.
    pub fn to_value(&self) -> Value {
        // An enum of a unit variant and a byte vector always serializes.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a JSON body received from the bus.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        Ok(serde_json::from_value(value)?)
    }
}
