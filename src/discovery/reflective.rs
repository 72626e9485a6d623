//! Enumerate the declared test methods of a worker type.

use super::{DiscoveryError, MethodEnumerator, MethodResolver, Target};
use crate::catalog::WorkerCatalog;
use crate::worker::TestWorker;

pub struct ReflectiveEnumerator {
    unit: String,
    methods: Vec<String>,
}

impl ReflectiveEnumerator {
    /// Enumerate a worker type known at compile time.
    pub fn of<W: TestWorker>() -> Self {
        Self {
            unit: W::unit_name().to_string(),
            methods: W::methods().names().map(str::to_string).collect(),
        }
    }

    /// Enumerate a worker unit by name. Fails if the catalog has no test worker registered under it.
    pub fn from_catalog(catalog: &WorkerCatalog, unit: &str) -> Result<Self, DiscoveryError> {
        let methods = catalog
            .methods(unit)
            .ok_or_else(|| DiscoveryError::NotATestWorker(unit.to_string()))?;
        Ok(Self {
            unit: unit.to_string(),
            methods: methods.to_vec(),
        })
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(&self.unit)
    }
}

impl MethodEnumerator for ReflectiveEnumerator {
    fn enumerate(&self) -> Result<Vec<String>, DiscoveryError> {
        if self.methods.is_empty() {
            return Err(DiscoveryError::NoTestMethods(self.unit.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        Ok(self.methods.iter().filter(|m| seen.insert(m.as_str())).cloned().collect())
    }
}

/// The identifier is the method name; the unit is fixed.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    unit: String,
}

impl IdentityResolver {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl MethodResolver for IdentityResolver {
    fn resolve(&self, identifier: &str) -> Option<Target> {
        Some(Target::new(&self.unit, identifier))
    }
}
