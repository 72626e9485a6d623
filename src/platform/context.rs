//! What a deployed worker sees of the world.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use harness_assert::Asserter;
use harness_core::{METHOD_NAME_KEY, PROPERTIES_KEY};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::DeploymentId;

/// Structured configuration delivered to a worker at deploy time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerConfig(Map<String, Value>);

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration selecting `method` as the test logic to run.
    pub fn for_method(method: &str) -> Self {
        Self::new().with(METHOD_NAME_KEY, Value::String(method.to_string()))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    /// Attach the suite's static properties. An empty object is not attached.
    pub fn with_properties(self, properties: Value) -> Self {
        match &properties {
            Value::Object(map) if map.is_empty() => self,
            _ => self.with(PROPERTIES_KEY, properties),
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        self.0.get(METHOD_NAME_KEY).and_then(Value::as_str)
    }

    /// A static property by name, if the suite supplied it.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.0.get(PROPERTIES_KEY)?.get(name)?.as_str()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// The worker's view of its deployment: configuration, facade and a runtime to schedule asynchronous work on.
///
/// Tasks started through [`WorkerContext::spawn`] or [`WorkerContext::block_on`] belong to the deployment and are
/// aborted when it is undeployed.
pub struct WorkerContext {
    config: WorkerConfig,
    deployment_id: DeploymentId,
    asserter: Asserter,
    runtime: Handle,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    handles: Vec<AbortHandle>,
    /// Set once the deployment is undeployed; later tasks are aborted as soon as they are tracked.
    closed: bool,
}

impl WorkerContext {
    pub fn new(config: WorkerConfig, deployment_id: DeploymentId, asserter: Asserter, runtime: Handle) -> Self {
        Self {
            config,
            deployment_id,
            asserter,
            runtime,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn method_name(&self) -> Option<&str> {
        self.config.method_name()
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    pub fn asserter(&self) -> &Asserter {
        &self.asserter
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Run `future` on the platform runtime as part of this deployment.
    ///
    /// A panic inside the task is reported through the facade as the test's failure.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = self.runtime.spawn(future);
        self.track(task.abort_handle());
        let asserter = self.asserter.clone();
        let deployment = self.deployment_id.clone();
        let watcher = self.runtime.spawn(async move {
            match task.await {
                Err(err) if err.is_panic() => {
                    tracing::debug!(%deployment, "worker task panicked");
                    asserter.handle_panic(err.into_panic().as_ref());
                }
                _ => {}
            }
        });
        self.track(watcher.abort_handle());
    }

    /// Drive `future` on the platform runtime and block the calling worker thread until it finishes.
    ///
    /// Returns `None` when the deployment is undeployed first. The future is dropped on the runtime then, which
    /// releases whatever it owns (a child process spawned with `kill_on_drop`, for instance). A panic inside the
    /// future resumes on the calling thread.
    pub fn block_on<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.tasks().closed {
            return None;
        }
        let task = self.runtime.spawn(future);
        self.track(task.abort_handle());
        match self.runtime.block_on(task) {
            Ok(output) => Some(output),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => {
                tracing::debug!(deployment = %self.deployment_id, "blocking call cancelled by undeploy");
                None
            }
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn track(&self, handle: AbortHandle) {
        let mut tasks = self.tasks();
        if tasks.closed {
            handle.abort();
            return;
        }
        tasks.handles.retain(|t| !t.is_finished());
        tasks.handles.push(handle);
    }

    /// Abort every task this deployment spawned and refuse new ones. Returns how many were still running.
    pub(crate) fn abort_tasks(&self) -> usize {
        let tasks = {
            let mut tasks = self.tasks();
            tasks.closed = true;
            std::mem::take(&mut tasks.handles)
        };
        let live = tasks.iter().filter(|t| !t.is_finished()).count();
        for task in tasks {
            task.abort();
        }
        live
    }
}
