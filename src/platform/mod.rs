//! The runtime platform: the thing that actually deploys and undeploys worker units.
//!
//! The bridge only talks to a platform through [`Platform`]: two asynchronous request/acknowledgment pairs and
//! the [`EventBus`] the completion message travels on. Acknowledgments arrive through callbacks invoked on the
//! platform's own threads, never on the caller's.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::bus::EventBus;

pub mod context;
pub mod local;

pub use context::{WorkerConfig, WorkerContext};
pub use local::LocalPlatform;

/// Opaque identifier the platform assigns to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to deploy one worker unit.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Name of the worker unit to instantiate.
    pub unit: String,
    /// Configuration delivered to the worker; carries at least the method name.
    pub config: WorkerConfig,
    /// Optional resource/inclusion manifest.
    pub includes: Option<String>,
    /// Number of instances. The bridge always asks for one.
    pub instances: usize,
}

impl DeployRequest {
    pub fn new(unit: impl Into<String>, config: WorkerConfig) -> Self {
        Self {
            unit: unit.into(),
            config,
            includes: None,
            instances: 1,
        }
    }

    pub fn with_includes(mut self, includes: Option<String>) -> Self {
        self.includes = includes;
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("no worker unit named `{0}` is known to the platform")]
    UnknownUnit(String),

    #[error("no live deployment with id `{0}`")]
    UnknownDeployment(DeploymentId),

    #[error("worker unit `{unit}` failed to start: {message}")]
    StartFailed { unit: String, message: String },

    #[error("unsupported instance count {0}; worker units are deployed one instance at a time")]
    UnsupportedInstances(usize),

    #[error("platform runtime unavailable: {0}")]
    Runtime(String),
}

pub type DeployCallback = Box<dyn FnOnce(Result<DeploymentId, PlatformError>) + Send>;
pub type UndeployCallback = Box<dyn FnOnce(Result<(), PlatformError>) + Send>;

/// Deploys and undeploys worker units on behalf of the bridge.
///
/// Implementations must invoke each callback exactly once, from their own execution context.
pub trait Platform: Send + Sync {
    /// The bus completion messages are published on.
    fn bus(&self) -> &Arc<EventBus>;

    fn deploy(&self, request: DeployRequest, done: DeployCallback);

    fn undeploy(&self, id: DeploymentId, done: UndeployCallback);
}
