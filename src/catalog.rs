//! Registry of deployable worker units.
//!
//! Reflective workers are registered by type and looked up by their unit name. Units that are not registered
//! fall back to the mounted script directory, if any: a unit naming an existing file under it deploys as a
//! [`ScriptWorker`].

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::platform::WorkerContext;
use crate::script::{ScriptHost, ScriptWorker};
use crate::worker::{Deployed, TestWorker, WorkerInstance};

pub type WorkerFactory = Arc<dyn Fn(&WorkerContext) -> Box<dyn WorkerInstance> + Send + Sync>;

struct Registered {
    factory: WorkerFactory,
    methods: Vec<String>,
}

struct ScriptMount {
    root: PathBuf,
    host: Arc<dyn ScriptHost>,
}

#[derive(Default)]
pub struct WorkerCatalog {
    workers: BTreeMap<String, Registered>,
    scripts: Option<ScriptMount>,
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker type under its [`TestWorker::unit_name`]. Re-registering a name replaces it.
    pub fn with_worker<W>(mut self) -> Self
    where
        W: TestWorker + Send + 'static,
    {
        let methods = W::methods().names().map(str::to_string).collect();
        let factory: WorkerFactory = Arc::new(|ctx: &WorkerContext| -> Box<dyn WorkerInstance> {
            Box::new(Deployed(W::create(ctx)))
        });
        if self
            .workers
            .insert(W::unit_name().to_string(), Registered { factory, methods })
            .is_some()
        {
            tracing::warn!(unit = W::unit_name(), "worker unit registered twice; keeping the last registration");
        }
        self
    }

    /// Serve unregistered units from script files under `root`, run through `host`.
    pub fn with_scripts(mut self, root: impl Into<PathBuf>, host: Arc<dyn ScriptHost>) -> Self {
        self.scripts = Some(ScriptMount {
            root: root.into(),
            host,
        });
        self
    }

    /// Whether `unit` names a registered reflective worker.
    pub fn is_registered(&self, unit: &str) -> bool {
        self.workers.contains_key(unit)
    }

    /// Declared test methods of a registered worker, in declaration order.
    pub fn methods(&self, unit: &str) -> Option<&[String]> {
        self.workers.get(unit).map(|r| r.methods.as_slice())
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Find the factory that instantiates `unit`.
    pub fn resolve(&self, unit: &str) -> Option<WorkerFactory> {
        if let Some(registered) = self.workers.get(unit) {
            return Some(Arc::clone(&registered.factory));
        }
        let mount = self.scripts.as_ref()?;
        let relative = Path::new(unit);
        // Only plain relative paths; a unit must not escape the script root.
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        if !mount.root.join(relative).is_file() {
            return None;
        }
        let host = Arc::clone(&mount.host);
        let script = relative.to_path_buf();
        Some(Arc::new(move |_ctx: &WorkerContext| -> Box<dyn WorkerInstance> {
            Box::new(ScriptWorker::new(Arc::clone(&host), script.clone()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptError;
    use crate::worker::{Completion, MethodResult, MethodTable};
    use tempfile::TempDir;

    struct Single;

    impl Single {
        fn test_one(&mut self, _ctx: &WorkerContext) -> MethodResult {
            Ok(())
        }
    }

    impl TestWorker for Single {
        fn unit_name() -> &'static str {
            "single"
        }

        fn create(_ctx: &WorkerContext) -> Self {
            Single
        }

        fn methods() -> MethodTable<Self> {
            MethodTable::new().with("test_one", Completion::OnReturn, Single::test_one)
        }
    }

    struct NoopHost;

    impl ScriptHost for NoopHost {
        fn invoke(&self, _script: &Path, _function: &str, _ctx: &WorkerContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    #[test]
    fn test_registered_worker_resolves_by_unit_name() {
        let catalog = WorkerCatalog::new().with_worker::<Single>();
        assert!(catalog.is_registered("single"));
        assert_eq!(catalog.methods("single"), Some(&["test_one".to_string()][..]));
        assert!(catalog.resolve("single").is_some());
        assert!(catalog.resolve("other").is_none());
    }

    #[test]
    fn test_script_fallback_requires_existing_file_under_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("suite")).unwrap();
        std::fs::write(dir.path().join("suite/a_test.js"), "").unwrap();
        let catalog = WorkerCatalog::new().with_scripts(dir.path(), Arc::new(NoopHost));

        assert!(catalog.resolve("suite/a_test.js").is_some());
        assert!(catalog.resolve("suite/missing.js").is_none());
        assert!(catalog.resolve("suite").is_none());
        assert!(catalog.resolve("../a_test.js").is_none());
    }
}
