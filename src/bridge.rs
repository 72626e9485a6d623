//! The execution bridge: run one test inside a worker and report it as if it ran on the calling thread.
//!
//! For each method identifier the bridge:
//! 1. subscribes to the completion address,
//! 2. deploys the resolved worker unit with `{methodName: ...}` as its configuration,
//! 3. blocks until the deployment is acknowledged,
//! 4. blocks until exactly one completion message arrives,
//! 5. unsubscribes,
//! 6. undeploys and blocks until that is acknowledged,
//! 7. turns a `failure` message back into the caller-visible failure.
//!
//! Every deployment carries a fresh correlation token in its configuration and the worker's sink stamps it on
//! each completion body. The bridge only accepts bodies bearing the token of the test it is running, so a
//! worker abandoned after a timeout cannot report into a later test.
//!
//! Each blocking wait gets the full configured timeout, measured from when that wait begins. A timed-out wait
//! aborts the test with a [`BridgeError`], which is distinct from the test failing.
//!
//! ## Timeouts and late acknowledgments
//!
//! - Deploy: the latch is closed and no undeploy is attempted (there is no id yet). If the deployment is
//!   acknowledged later, the callback finds the latch closed and undeploys the stray deployment itself.
//! - Completion: the subscription is removed and an undeploy is requested without waiting for it.
//! - Undeploy: reported as-is; a failure captured from the worker is logged, not reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use harness_core::{COMPLETION_ADDRESS, COMPLETION_TOKEN_KEY, CapsuleError, CompletionMessage, FailureCapsule, MessageError};
use serde_json::Value;
use thiserror::Error;

use crate::bus::{EventBus, Subscription};
use crate::config::HarnessConfig;
use crate::discovery::{MethodResolver, Target};
use crate::latch::Latch;
use crate::platform::{DeployRequest, DeploymentId, Platform, PlatformError, WorkerConfig};

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> String {
    format!("run-{}-{}", std::process::id(), NEXT_RUN.fetch_add(1, Ordering::Relaxed))
}

/// The harness itself malfunctioned; the test's own verdict is unknown.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot resolve test `{0}` to a worker unit and method")]
    Unresolvable(String),

    #[error("deploy request failed: {0}")]
    Deploy(#[source] PlatformError),

    #[error("timed out after {0:?} waiting for the worker to deploy")]
    DeployTimeout(Duration),

    #[error("timed out after {0:?} waiting for the test to complete")]
    CompletionTimeout(Duration),

    #[error("malformed completion message: {0}")]
    Message(#[from] MessageError),

    #[error("failed to reconstruct the worker's failure: {0}")]
    CapsuleTransport(#[from] CapsuleError),

    #[error("undeploy request failed: {0}")]
    Undeploy(#[source] PlatformError),

    #[error("timed out after {0:?} waiting for the worker to undeploy")]
    UndeployTimeout(Duration),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BridgeError::DeployTimeout(_) | BridgeError::CompletionTimeout(_) | BridgeError::UndeployTimeout(_)
        )
    }
}

/// A failure captured inside the worker, reconstructed on the caller's side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure(pub FailureCapsule);

impl RemoteFailure {
    pub fn capsule(&self) -> &FailureCapsule {
        &self.0
    }

    pub fn message(&self) -> Option<&str> {
        self.0.message()
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.render())
    }
}

impl std::error::Error for RemoteFailure {}

/// Verdict for one test.
#[derive(Debug)]
pub enum TestOutcome {
    Passed,
    /// The test ran and failed.
    Failed(RemoteFailure),
    /// The harness could not determine a verdict.
    Aborted(BridgeError),
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    /// The text reported for a failed or aborted test.
    pub fn failure_text(&self) -> Option<String> {
        match self {
            TestOutcome::Passed => None,
            TestOutcome::Failed(failure) => Some(failure.to_string()),
            TestOutcome::Aborted(err) => Some(format!("harness error: {err}")),
        }
    }

    /// Re-raise a failure on the calling thread, so an enclosing `#[test]` reports it.
    #[track_caller]
    pub fn raise(self) {
        if let Some(text) = self.failure_text() {
            panic!("{text}");
        }
    }
}

/// Removes the completion subscription when dropped, so no exit path can leak it into the next test.
struct SubscriptionGuard<'a> {
    bus: &'a EventBus,
    subscription: Option<Subscription>,
}

impl SubscriptionGuard<'_> {
    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(&subscription);
            tracing::debug!("unsubscribed from completion address");
        }
    }
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct ExecutionBridge {
    platform: Arc<dyn Platform>,
    resolver: Arc<dyn MethodResolver>,
    config: HarnessConfig,
    includes: Option<String>,
}

impl ExecutionBridge {
    pub fn new(platform: Arc<dyn Platform>, resolver: Arc<dyn MethodResolver>, config: HarnessConfig) -> Self {
        let includes = config.includes.clone();
        Self {
            platform,
            resolver,
            config,
            includes,
        }
    }

    /// Use a suite-specific resource manifest instead of the configured one.
    pub fn with_includes(mut self, includes: Option<String>) -> Self {
        if includes.is_some() {
            self.includes = includes;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Run one test to completion and return its verdict.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn run_test(&self, identifier: &str) -> TestOutcome {
        match self.execute(identifier) {
            Ok(None) => TestOutcome::Passed,
            Ok(Some(capsule)) => {
                tracing::debug!(failure = %capsule.render(), "test failed in worker");
                TestOutcome::Failed(RemoteFailure(capsule))
            }
            Err(err) => {
                if err.is_timeout() {
                    tracing::warn!(error = %err, "test aborted");
                } else {
                    tracing::debug!(error = %err, "test aborted");
                }
                TestOutcome::Aborted(err)
            }
        }
    }

    fn execute(&self, identifier: &str) -> Result<Option<FailureCapsule>, BridgeError> {
        let target = self
            .resolver
            .resolve(identifier)
            .ok_or_else(|| BridgeError::Unresolvable(identifier.to_string()))?;
        let timeout = self.config.timeout;
        let bus: &EventBus = self.platform.bus();

        let token = next_token();
        let completion: Arc<Latch<Value>> = Arc::new(Latch::new());
        let slot = Arc::clone(&completion);
        let expected = token.clone();
        let mut subscription = SubscriptionGuard {
            bus,
            subscription: Some(bus.subscribe(COMPLETION_ADDRESS, move |body| {
                let stamped = body.get(COMPLETION_TOKEN_KEY).and_then(Value::as_str);
                if stamped != Some(expected.as_str()) {
                    tracing::debug!(token = ?stamped, "completion message for another test ignored");
                } else if slot.signal(body).is_err() {
                    tracing::warn!("additional completion message ignored");
                }
            })),
        };
        tracing::debug!(address = COMPLETION_ADDRESS, "subscribed to completion address");

        let id = self.deploy(&target, &token, timeout)?;

        let body = match completion.wait(timeout) {
            Ok(body) => body,
            Err(_) => match completion.close() {
                Some(body) => body,
                None => {
                    subscription.release();
                    tracing::warn!(deployment = %id, "no completion message; undeploying without waiting");
                    self.platform.undeploy(
                        id,
                        Box::new(|result| {
                            if let Err(err) = result {
                                tracing::debug!(error = %err, "undeploy after completion timeout failed");
                            }
                        }),
                    );
                    return Err(BridgeError::CompletionTimeout(timeout));
                }
            },
        };
        subscription.release();

        let captured = decode(body);
        if let Err(err) = self.undeploy(id, timeout) {
            if let Ok(Some(capsule)) = &captured {
                tracing::warn!(failure = %capsule, "worker failure superseded by undeploy error");
            }
            return Err(err);
        }
        captured
    }

    fn deploy(&self, target: &Target, token: &str, timeout: Duration) -> Result<DeploymentId, BridgeError> {
        let config = WorkerConfig::for_method(&target.method)
            .with(COMPLETION_TOKEN_KEY, Value::String(token.to_string()))
            .with_properties(self.config.properties_value());
        let request = DeployRequest::new(&target.unit, config).with_includes(self.includes.clone());

        let deployed: Arc<Latch<Result<DeploymentId, PlatformError>>> = Arc::new(Latch::new());
        let ack = Arc::clone(&deployed);
        let platform: Weak<dyn Platform> = Arc::downgrade(&self.platform);
        tracing::debug!(unit = %target.unit, method = %target.method, "deploying");
        self.platform.deploy(
            request,
            Box::new(move |result| {
                let Err(Ok(id)) = ack.signal(result) else { return };
                // The bridge stopped waiting for this deployment; nobody else will undeploy it.
                tracing::warn!(deployment = %id, "deployment acknowledged after timeout; undeploying");
                if let Some(platform) = platform.upgrade() {
                    platform.undeploy(id, Box::new(|_| {}));
                }
            }),
        );

        let acknowledged = match deployed.wait(timeout) {
            Ok(result) => result,
            Err(_) => deployed.close().ok_or(BridgeError::DeployTimeout(timeout))?,
        };
        let id = acknowledged.map_err(BridgeError::Deploy)?;
        tracing::debug!(deployment = %id, "deployed");
        Ok(id)
    }

    fn undeploy(&self, id: DeploymentId, timeout: Duration) -> Result<(), BridgeError> {
        let undeployed: Arc<Latch<Result<(), PlatformError>>> = Arc::new(Latch::new());
        let ack = Arc::clone(&undeployed);
        tracing::debug!(deployment = %id, "undeploying");
        self.platform.undeploy(
            id,
            Box::new(move |result| {
                if ack.signal(result).is_err() {
                    tracing::warn!("undeploy acknowledged after timeout");
                }
            }),
        );
        let acknowledged = match undeployed.wait(timeout) {
            Ok(result) => result,
            Err(_) => undeployed.close().ok_or(BridgeError::UndeployTimeout(timeout))?,
        };
        acknowledged.map_err(BridgeError::Undeploy)
    }
}

fn decode(mut body: Value) -> Result<Option<FailureCapsule>, BridgeError> {
    if let Some(map) = body.as_object_mut() {
        map.remove(COMPLETION_TOKEN_KEY);
    }
    let message = CompletionMessage::from_value(body)?;
    Ok(message.capsule().transpose()?)
}
