//! Harness configuration: wait timeout, suite properties and per-suite discovery metadata.
//!
//! Configuration is layered the same way for every run:
//! 1. built-in defaults,
//! 2. an optional `harness.properties` file in the working directory,
//! 3. the `WORKER_HARNESS_TIMEOUT` environment variable (seconds), which wins over the file.
//!
//! Environment access goes through a lookup closure so callers (and tests) never have to mutate the process
//! environment.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

/// Timeout applied to each blocking wait of the bridge when nothing overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable overriding the wait timeout, in whole seconds.
pub const TIMEOUT_ENV: &str = "WORKER_HARNESS_TIMEOUT";

/// Properties file looked up in the working directory.
pub const PROPERTIES_FILE: &str = "harness.properties";

/// Default base-name filter for script discovery.
pub const DEFAULT_FILENAME_FILTER: &str = r".+\.js";

/// Default function-definition pattern for script discovery. The first capture group is the function name.
pub const DEFAULT_FUNCTION_PATTERN: &str = r"function\s+(test[A-Za-z0-9_]*)\s*\(";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timeout `{value}` from {origin}: expected a whole number of seconds")]
    InvalidTimeout { value: String, origin: String },

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run-wide settings shared by every test the bridge executes.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Applied independently to the deploy, completion and undeploy waits.
    pub timeout: Duration,
    /// Resource manifest passed with every deploy request unless the suite names its own.
    pub includes: Option<String>,
    /// Static metadata handed to every worker.
    pub properties: BTreeMap<String, String>,
    /// `owner~name~version`, when the properties name all three parts.
    pub module_name: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            includes: None,
            properties: BTreeMap::new(),
            module_name: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration for the current working directory and process environment.
    pub fn from_environment() -> Result<Self, ConfigError> {
        let dir = std::env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::load(&dir, |key| std::env::var(key).ok())
    }

    /// Load configuration from `dir` using `lookup` to read environment variables.
    pub fn load(dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = dir.join(PROPERTIES_FILE);
        let properties = if path.is_file() {
            let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "loaded harness properties");
            parse_properties(&text)
        } else {
            BTreeMap::new()
        };

        let timeout = match lookup(TIMEOUT_ENV) {
            Some(value) => parse_timeout(&value, TIMEOUT_ENV)?,
            None => match properties.get("timeout") {
                Some(value) => parse_timeout(value, PROPERTIES_FILE)?,
                None => DEFAULT_TIMEOUT,
            },
        };

        let includes = properties.get("includes").map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string);
        let module_name = module_name(&properties);

        Ok(Self {
            timeout,
            includes,
            properties,
            module_name,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The static metadata object placed in each worker's configuration.
    pub fn properties_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if let Some(name) = &self.module_name {
            map.insert("modulename".to_string(), Value::String(name.clone()));
        }
        Value::Object(map)
    }
}

fn parse_timeout(value: &str, origin: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidTimeout {
            value: value.to_string(),
            origin: origin.to_string(),
        })
}

fn module_name(properties: &BTreeMap<String, String>) -> Option<String> {
    let owner = properties.get("modowner")?;
    let name = properties.get("modname")?;
    let version = properties.get("version")?;
    Some(format!("{owner}~{name}~{version}"))
}

/// Parse `key=value` property lines.
///
/// `#` and `!` start comment lines; `:` is accepted as a separator too. A key with no separator maps to an
/// empty value. Later duplicates win.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(['=', ':']) {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };
        out.insert(key.trim().to_string(), value.trim().to_string());
    }
    out
}

/// Per-suite discovery metadata: where script tests live and how to recognise them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteInfo {
    /// Resource manifest for this suite's deployments. Blank means none.
    pub includes: Option<String>,
    pub scripts_directory: PathBuf,
    /// Regular expression matched against whole file base names.
    pub filename_filter: String,
    /// Regular expression whose first capture group is a test function name.
    pub function_pattern: String,
}

impl SuiteInfo {
    pub fn new(scripts_directory: impl Into<PathBuf>) -> Self {
        Self {
            includes: None,
            scripts_directory: scripts_directory.into(),
            filename_filter: DEFAULT_FILENAME_FILTER.to_string(),
            function_pattern: DEFAULT_FUNCTION_PATTERN.to_string(),
        }
    }

    pub fn with_filename_filter(mut self, filter: impl Into<String>) -> Self {
        self.filename_filter = filter.into();
        self
    }

    pub fn with_function_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.function_pattern = pattern.into();
        self
    }

    pub fn with_includes(mut self, includes: impl Into<String>) -> Self {
        let includes = includes.into();
        let trimmed = includes.trim();
        self.includes = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }
}
