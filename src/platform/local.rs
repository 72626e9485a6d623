//! In-process platform backed by a multi-threaded tokio runtime.
//!
//! Each deployment gets its own [`WorkerContext`] whose facade is bound to the platform bus. Deploy and undeploy
//! work runs on the runtime's blocking pool, so acknowledgments always arrive on a platform thread.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use harness_assert::{Asserter, panic_message};
use harness_core::{COMPLETION_ADDRESS, COMPLETION_TOKEN_KEY};
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};

use super::{DeployCallback, DeployRequest, DeploymentId, Platform, PlatformError, UndeployCallback, WorkerContext};
use crate::bus::{BusSink, EventBus};
use crate::catalog::WorkerCatalog;
use crate::worker::WorkerInstance;

struct Deployment {
    unit: String,
    instance: Arc<Mutex<Box<dyn WorkerInstance>>>,
    context: Arc<WorkerContext>,
}

type Deployments = Arc<Mutex<HashMap<DeploymentId, Deployment>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct LocalPlatform {
    // Kept in an Option so Drop can shut it down without waiting on wedged workers.
    runtime: Option<Runtime>,
    handle: Handle,
    bus: Arc<EventBus>,
    catalog: Arc<WorkerCatalog>,
    deployments: Deployments,
    next_id: AtomicU64,
}

impl LocalPlatform {
    pub fn new(catalog: WorkerCatalog) -> Result<Self, PlatformError> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("harness-worker")
            .build()
            .map_err(|e| PlatformError::Runtime(e.to_string()))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            bus: Arc::new(EventBus::new()),
            catalog: Arc::new(catalog),
            deployments: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn catalog(&self) -> &WorkerCatalog {
        &self.catalog
    }

    /// Number of deployments that have been acknowledged and not yet undeployed.
    pub fn live_deployments(&self) -> usize {
        lock(&self.deployments).len()
    }

    fn next_deployment_id(&self) -> DeploymentId {
        DeploymentId::new(format!("deployment-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Drop for LocalPlatform {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Instantiate the unit and run its start hook. The method itself runs after the acknowledgment.
fn start_deployment(
    catalog: &WorkerCatalog,
    bus: &Arc<EventBus>,
    handle: &Handle,
    id: &DeploymentId,
    request: DeployRequest,
) -> Result<Deployment, PlatformError> {
    if request.instances != 1 {
        return Err(PlatformError::UnsupportedInstances(request.instances));
    }
    let factory = catalog
        .resolve(&request.unit)
        .ok_or_else(|| PlatformError::UnknownUnit(request.unit.clone()))?;
    if let Some(includes) = &request.includes {
        tracing::debug!(unit = %request.unit, includes, "deployment includes");
    }

    let token = request
        .config
        .get(COMPLETION_TOKEN_KEY)
        .and_then(Value::as_str)
        .map(str::to_string);
    let sink = BusSink::new(Arc::clone(bus), COMPLETION_ADDRESS).with_token(token);
    let asserter = Asserter::bound(Arc::new(sink));
    let context = Arc::new(WorkerContext::new(request.config, id.clone(), asserter, handle.clone()));
    let started = catch_unwind(AssertUnwindSafe(|| {
        let mut instance = factory(&context);
        instance.start(&context);
        instance
    }));
    match started {
        Ok(instance) => Ok(Deployment {
            unit: request.unit,
            instance: Arc::new(Mutex::new(instance)),
            context,
        }),
        Err(payload) => {
            context.abort_tasks();
            Err(PlatformError::StartFailed {
                unit: request.unit,
                message: panic_message(payload.as_ref()).unwrap_or_else(|| "start hook panicked".to_string()),
            })
        }
    }
}

impl Platform for LocalPlatform {
    fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn deploy(&self, request: DeployRequest, done: DeployCallback) {
        let id = self.next_deployment_id();
        let catalog = Arc::clone(&self.catalog);
        let bus = Arc::clone(&self.bus);
        let deployments = Arc::clone(&self.deployments);
        let handle = self.handle.clone();

        self.handle.spawn_blocking(move || {
            let deployment = match start_deployment(&catalog, &bus, &handle, &id, request) {
                Ok(deployment) => deployment,
                Err(err) => {
                    tracing::debug!(error = %err, "deploy failed");
                    done(Err(err));
                    return;
                }
            };
            let instance = Arc::clone(&deployment.instance);
            let context = Arc::clone(&deployment.context);
            tracing::debug!(deployment = %id, unit = %deployment.unit, "deployed");
            lock(&deployments).insert(id.clone(), deployment);
            done(Ok(id.clone()));

            let mut instance = lock(&instance);
            // An undeploy that raced ahead of us has already stopped the worker.
            if lock(&deployments).contains_key(&id) {
                instance.run(&context);
            }
        });
    }

    fn undeploy(&self, id: DeploymentId, done: UndeployCallback) {
        let deployments = Arc::clone(&self.deployments);
        self.handle.spawn_blocking(move || {
            let Some(deployment) = lock(&deployments).remove(&id) else {
                done(Err(PlatformError::UnknownDeployment(id)));
                return;
            };
            let aborted = deployment.context.abort_tasks();
            // Waits for the running method, if any, to return before the stop hook runs.
            let stopped = catch_unwind(AssertUnwindSafe(|| {
                lock(&deployment.instance).stop(&deployment.context);
            }));
            if let Err(payload) = stopped {
                let message = panic_message(payload.as_ref()).unwrap_or_default();
                tracing::warn!(deployment = %id, unit = %deployment.unit, %message, "stop hook panicked");
            }
            tracing::debug!(deployment = %id, aborted, "undeployed");
            done(Ok(()));
        });
    }
}
