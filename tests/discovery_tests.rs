//! Discovery over real directory trees and registered workers.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use worker_harness::prelude::*;
use worker_harness::{DiscoveryError, MethodEnumerator, PatternEnumerator, SuiteInfo};

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn enumerate(suite: &SuiteInfo) -> Result<Vec<String>, DiscoveryError> {
    PatternEnumerator::new(suite)?.enumerate()
}

#[test]
fn one_file_two_functions() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "basic_test.js",
        "function testA() { assert(true); }\n\nfunction helper() {}\n\nfunction testB () {}\n",
    );

    let ids = enumerate(&SuiteInfo::new(dir.path())).unwrap();
    assert_eq!(ids, ["basic_test.js.testA", "basic_test.js.testB"]);
}

#[test]
fn nested_directories_use_forward_slashes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b_test.js", "function testTop() {}");
    write(dir.path(), "a/deep/inner_test.js", "function testInner() {}");
    write(dir.path(), "a/notes.txt", "function testIgnored() {}");

    let ids = enumerate(&SuiteInfo::new(dir.path())).unwrap();
    insta::assert_debug_snapshot!(ids, @r#"
    [
        "a/deep/inner_test.js.testInner",
        "b_test.js.testTop",
    ]
    "#);
}

#[test]
fn filter_and_pattern_are_configurable() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "cache_check.rb", "def check_hit\nend\ndef check_miss\nend\ndef helper\nend\n");
    write(dir.path(), "other.rb", "def check_elsewhere\nend\n");

    let suite = SuiteInfo::new(dir.path())
        .with_filename_filter(r".+_check\.rb")
        .with_function_pattern(r"def\s+(check_\w+)");
    let ids = enumerate(&suite).unwrap();
    assert_eq!(ids, ["cache_check.rb.check_hit", "cache_check.rb.check_miss"]);
}

#[test]
fn filter_matches_whole_base_name() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "test.json", "function testNotAScript() {}");

    let suite = SuiteInfo::new(dir.path()).with_filename_filter(r".+\.js");
    assert!(matches!(enumerate(&suite), Err(DiscoveryError::NoFiles { .. })));
}

#[test]
fn duplicate_functions_run_once() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dup.js", "function testSame() {}\nfunction testSame() {}\n");

    let ids = enumerate(&SuiteInfo::new(dir.path())).unwrap();
    assert_eq!(ids, ["dup.js.testSame"]);
}

#[test]
fn missing_root_empty_root_and_no_matches_are_distinct() {
    let dir = TempDir::new().unwrap();

    let missing = enumerate(&SuiteInfo::new(dir.path().join("absent")));
    assert!(matches!(missing, Err(DiscoveryError::MissingRoot(_))), "{missing:?}");

    let empty = enumerate(&SuiteInfo::new(dir.path()));
    assert!(matches!(empty, Err(DiscoveryError::NoFiles { .. })), "{empty:?}");

    write(dir.path(), "quiet.js", "function helper() {}");
    let no_methods = enumerate(&SuiteInfo::new(dir.path()));
    assert!(
        matches!(no_methods, Err(DiscoveryError::NoMethods { files: 1, .. })),
        "{no_methods:?}"
    );
}

#[test]
fn invalid_pattern_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let suite = SuiteInfo::new(dir.path()).with_function_pattern("function (test");
    let err = PatternEnumerator::new(&suite).err().unwrap();
    assert!(matches!(err, DiscoveryError::InvalidPattern { what: "function", .. }));
}

#[test]
fn diagnostics_carry_codes() {
    use miette::Diagnostic;

    let err = DiscoveryError::MissingRoot("scripts".into());
    assert_eq!(err.code().unwrap().to_string(), "discovery::missing_root");
    assert!(err.help().is_some());
}

#[derive(Default)]
struct Ledger;

#[test_worker]
impl Ledger {
    #[test_method]
    fn test_credit(&mut self, _ctx: &WorkerContext) {}

    #[test_method]
    fn test_debit(&mut self, _ctx: &WorkerContext) {}

    fn not_a_test(&self) -> u32 {
        7
    }
}

#[derive(Default)]
struct Empty;

#[test_worker(name = "empty")]
impl Empty {}

#[test]
fn reflective_enumeration_lists_marked_methods_in_order() {
    let ids = ReflectiveEnumerator::of::<Ledger>().enumerate().unwrap();
    assert_eq!(ids, ["test_credit", "test_debit"]);
    assert_eq!(Ledger.not_a_test(), 7);
}

#[test]
fn reflective_enumeration_rejects_empty_and_unregistered_units() {
    let catalog = WorkerCatalog::new().with_worker::<Ledger>().with_worker::<Empty>();

    let empty = ReflectiveEnumerator::from_catalog(&catalog, "empty").unwrap().enumerate();
    assert!(matches!(empty, Err(DiscoveryError::NoTestMethods(ref unit)) if unit == "empty"));

    let unknown = ReflectiveEnumerator::from_catalog(&catalog, "nobody").err().unwrap();
    assert!(matches!(unknown, DiscoveryError::NotATestWorker(ref unit) if unit == "nobody"));
}
