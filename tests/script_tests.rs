//! Script tests run end to end: discovered by pattern, deployed as script workers, executed by `sh`.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use worker_harness::prelude::*;
use worker_harness::{
    CommandScriptHost, DeployRequest, FailureKind, Latch, MethodEnumerator, PatternEnumerator, Platform,
    RecordingReporter, RunOptions, Runner, ScriptResolver, SuiteInfo, WorkerConfig,
};

const MATH: &str = r#"
testAdds() {
  [ $((2 + 2)) -eq 4 ] || { echo "assertion failed: expected:<4> but was:<$((2 + 2))>" >&2; exit 1; }
}

testBroken() {
  echo "running testBroken"
  echo "assertion failed: expected:<1> but was:<2>" >&2
  exit 1
}

testSilent() {
  exit 3
}

testSeesEnvironment() {
  [ "$WORKER_HARNESS_METHOD" = testSeesEnvironment ] || { echo "assertion failed: method" >&2; exit 1; }
  case "$WORKER_HARNESS_CONFIG" in
    *'"modname":"cache"'*) ;;
    *) echo "assertion failed: properties missing" >&2; exit 1 ;;
  esac
}

"$1"
"#;

const INNER: &str = r#"
testNested() {
  true
}

"$1"
"#;

const HANG: &str = r#"
testHangs() {
  exec sleep 30
}

"$1"
"#;

fn suite(root: &Path) -> SuiteInfo {
    SuiteInfo::new(root)
        .with_filename_filter(r".+_test\.sh")
        .with_function_pattern(r"(?m)^(test\w+)\(\)")
}

fn scripts() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("math_test.sh"), MATH).unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/inner_test.sh"), INNER).unwrap();
    fs::write(dir.path().join("helpers.sh"), "testNotCollected() { true; }\n").unwrap();
    dir
}

fn platform(root: &Path, program: &str) -> Arc<LocalPlatform> {
    let host = CommandScriptHost::new(root, program);
    let catalog = WorkerCatalog::new().with_scripts(root, Arc::new(host));
    Arc::new(LocalPlatform::new(catalog).unwrap())
}

fn bridge(root: &Path, program: &str) -> ExecutionBridge {
    let platform = platform(root, program);
    let config = HarnessConfig {
        properties: BTreeMap::from([("modname".to_string(), "cache".to_string())]),
        ..HarnessConfig::default().with_timeout(Duration::from_secs(30))
    };
    ExecutionBridge::new(platform, Arc::new(ScriptResolver), config)
}

#[test]
fn discovers_script_functions() {
    let dir = scripts();
    let ids = PatternEnumerator::new(&suite(dir.path())).unwrap().enumerate().unwrap();
    assert_eq!(
        ids,
        [
            "math_test.sh.testAdds",
            "math_test.sh.testBroken",
            "math_test.sh.testSilent",
            "math_test.sh.testSeesEnvironment",
            "sub/inner_test.sh.testNested",
        ]
    );
}

#[test]
fn passing_and_failing_scripts() {
    let dir = scripts();
    let bridge = bridge(dir.path(), "sh");

    assert!(bridge.run_test("math_test.sh.testAdds").is_passed());
    assert!(bridge.run_test("sub/inner_test.sh.testNested").is_passed());

    let outcome = bridge.run_test("math_test.sh.testSeesEnvironment");
    assert!(outcome.is_passed(), "{outcome:?}");

    match bridge.run_test("math_test.sh.testBroken") {
        TestOutcome::Failed(failure) => {
            assert_eq!(failure.capsule().kind(), FailureKind::Assertion);
            assert_eq!(failure.capsule().type_name(), "AssertionFailed");
            assert_eq!(failure.message(), Some("assertion failed: expected:<1> but was:<2>"));
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    match bridge.run_test("math_test.sh.testSilent") {
        TestOutcome::Failed(failure) => {
            assert_eq!(failure.capsule().kind(), FailureKind::Error);
            assert_eq!(failure.capsule().type_name(), "ScriptError");
            assert_eq!(failure.message(), Some("`testSilent` exited with status 3"));
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn missing_interpreter_fails_the_test() {
    let dir = scripts();
    let bridge = bridge(dir.path(), "definitely-not-an-interpreter");
    match bridge.run_test("math_test.sh.testAdds") {
        TestOutcome::Failed(failure) => assert_eq!(failure.capsule().type_name(), "ScriptLaunchError"),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn undeploy_kills_a_hung_script() {
    let dir = scripts();
    fs::write(dir.path().join("hang.sh"), HANG).unwrap();
    let platform = platform(dir.path(), "sh");
    let wait = Duration::from_secs(10);

    let deployed = Arc::new(Latch::new());
    let ack = deployed.clone();
    platform.deploy(
        DeployRequest::new("hang.sh", WorkerConfig::for_method("testHangs")),
        Box::new(move |result| {
            let _ = ack.signal(result);
        }),
    );
    let id = deployed.wait(wait).unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let start = Instant::now();
    let undeployed = Arc::new(Latch::new());
    let ack = undeployed.clone();
    platform.undeploy(
        id,
        Box::new(move |result| {
            let _ = ack.signal(result);
        }),
    );
    assert_eq!(undeployed.wait(wait).unwrap(), Ok(()));
    assert!(start.elapsed() < wait, "undeploy waited for the script: {:?}", start.elapsed());
    assert_eq!(platform.live_deployments(), 0);
}

#[test]
fn unknown_script_is_a_deploy_error() {
    let dir = scripts();
    let bridge = bridge(dir.path(), "sh");
    let outcome = bridge.run_test("nowhere_test.sh.testAdds");
    assert!(matches!(outcome, TestOutcome::Aborted(worker_harness::BridgeError::Deploy(_))), "{outcome:?}");

    let escaping = bridge.run_test("../math_test.sh.testAdds");
    assert!(matches!(escaping, TestOutcome::Aborted(_)), "{escaping:?}");
}

#[test]
fn runner_over_a_script_suite() {
    let dir = scripts();
    let bridge = bridge(dir.path(), "sh");
    let enumerator = PatternEnumerator::new(&suite(dir.path())).unwrap();
    let mut reporter = RecordingReporter::new();
    let summary = Runner::new(&bridge, RunOptions::default())
        .run(&enumerator, &mut reporter)
        .unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.aborted, 0);
    assert!(!summary.success());
}
