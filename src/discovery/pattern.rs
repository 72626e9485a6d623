//! Enumerate test functions defined in script files.
//!
//! Files are collected recursively under the scripts directory (directories are always traversed; the filename
//! filter applies to base names only). Every match of the function pattern in a file's text yields the
//! identifier `relative/path.ext.functionName`, with `/` as the path separator on every platform.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use super::{DiscoveryError, MethodEnumerator, MethodResolver, Target};
use crate::config::SuiteInfo;

pub struct PatternEnumerator {
    root: PathBuf,
    filter_source: String,
    filter: Regex,
    pattern_source: String,
    pattern: Regex,
}

fn compile(what: &'static str, pattern: &str, anchored: bool) -> Result<Regex, DiscoveryError> {
    let source = if anchored {
        format!("^(?:{pattern})$")
    } else {
        pattern.to_string()
    };
    Regex::new(&source).map_err(|source| DiscoveryError::InvalidPattern {
        what,
        pattern: pattern.to_string(),
        source: Box::new(source),
    })
}

impl PatternEnumerator {
    pub fn new(suite: &SuiteInfo) -> Result<Self, DiscoveryError> {
        Ok(Self {
            root: suite.scripts_directory.clone(),
            filter: compile("filename", &suite.filename_filter, true)?,
            filter_source: suite.filename_filter.clone(),
            pattern: compile("function", &suite.function_pattern, false)?,
            pattern_source: suite.function_pattern.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Script files under the root whose base name matches the filter, as sorted relative paths.
    pub fn script_files(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        if !self.root.is_dir() {
            return Err(DiscoveryError::MissingRoot(self.root.clone()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(&self.root).to_path_buf();
                DiscoveryError::Io {
                    path,
                    source: err.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            if !self.filter.is_match(name) {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                files.push(relative.to_path_buf());
            }
        }
        Ok(files)
    }

    fn functions_in(&self, text: &str) -> Vec<String> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Render a relative path with `/` separators.
fn identifier_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl MethodEnumerator for PatternEnumerator {
    fn enumerate(&self) -> Result<Vec<String>, DiscoveryError> {
        let files = self.script_files()?;
        if files.is_empty() {
            return Err(DiscoveryError::NoFiles {
                root: self.root.clone(),
                filter: self.filter_source.clone(),
            });
        }

        let mut identifiers = Vec::new();
        let mut seen = HashSet::new();
        for relative in &files {
            let path = self.root.join(relative);
            let text = fs::read_to_string(&path).map_err(|source| DiscoveryError::Io {
                path: path.clone(),
                source,
            })?;
            let prefix = identifier_path(relative);
            for function in self.functions_in(&text) {
                let identifier = format!("{prefix}.{function}");
                if seen.insert(identifier.clone()) {
                    identifiers.push(identifier);
                } else {
                    tracing::warn!(%identifier, "function defined more than once; running it once");
                }
            }
        }

        if identifiers.is_empty() {
            return Err(DiscoveryError::NoMethods {
                root: self.root.clone(),
                pattern: self.pattern_source.clone(),
                files: files.len(),
            });
        }
        tracing::debug!(root = %self.root.display(), files = files.len(), tests = identifiers.len(), "discovered script tests");
        Ok(identifiers)
    }
}

/// Splits `path.ext.function` at the last `.`: the script path is the unit, the function is the method.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptResolver;

impl MethodResolver for ScriptResolver {
    fn resolve(&self, identifier: &str) -> Option<Target> {
        let (unit, method) = identifier.rsplit_once('.')?;
        if unit.is_empty() || method.is_empty() {
            return None;
        }
        Some(Target::new(unit, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_splits_at_last_dot() {
        assert_eq!(
            ScriptResolver.resolve("suite/cache_test.js.testGet"),
            Some(Target::new("suite/cache_test.js", "testGet"))
        );
        assert_eq!(ScriptResolver.resolve("noseparator"), None);
        assert_eq!(ScriptResolver.resolve("trailing."), None);
        assert_eq!(ScriptResolver.resolve(".leading"), None);
    }

    #[test]
    fn test_function_pattern_uses_first_group() {
        let enumerator = PatternEnumerator::new(&SuiteInfo::new("unused")).unwrap();
        let text = "function testA() {}\nfunction helper() {}\nfunction   testB_2 (x) {}\n";
        assert_eq!(enumerator.functions_in(text), ["testA", "testB_2"]);
    }

    #[test]
    fn test_filter_is_anchored_to_whole_name() {
        let enumerator = PatternEnumerator::new(&SuiteInfo::new("unused")).unwrap();
        assert!(enumerator.filter.is_match("a.js"));
        assert!(!enumerator.filter.is_match("a.json"));
        assert!(!enumerator.filter.is_match(".js"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let suite = SuiteInfo::new("unused").with_function_pattern("function (");
        let err = PatternEnumerator::new(&suite).err().unwrap();
        assert!(matches!(err, DiscoveryError::InvalidPattern { what: "function", .. }));
    }
}
