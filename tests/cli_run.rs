// tests/cli_run.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use orchestrator::cli::CliArgs;
use orchestrator::{EXIT_ERROR, EXIT_RUN_FAILED, exit_code, run_with_output};
use orchestrator_test_utils::{SharedBuffer, init_tracing, with_timeout};

const PIPELINE: &str = r#"
[orchestrator]
tick_interval_ms = 10
record_log = "out/records.jsonl"

[retry]
max_retries = 1
base_backoff_ms = 10

[worker.local]
capacity = 2

[job.a]
task = { kind = "command", cmd = "exit 1" }

[job.b]
after = ["a"]

[job.c]
after = ["a"]

[job.d]
schema = "build"
params = { target = "debug" }
"#;

const SCHEMAS: &str = r#"
[schema.build.fields.target]
type = "string"
required = true
"#;

fn args(config: &Path, dry_run: bool) -> CliArgs {
    CliArgs {
        config: Some(config.display().to_string()),
        schemas: None,
        log_level: None,
        dry_run,
        emit_events: true,
    }
}

/// Config dir with the pipeline above and its schemas next to it.
fn pipeline_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("orchestrator.toml"), PIPELINE).unwrap();
    fs::create_dir(dir.path().join("schemas")).unwrap();
    fs::write(dir.path().join("schemas/build.toml"), SCHEMAS).unwrap();
    dir
}

fn json_lines(text: &str) -> Vec<Value> {
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn shipped_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[tokio::test]
async fn dry_run_prints_the_plan_without_running_anything() {
    init_tracing();
    let dir = pipeline_dir();
    let out = SharedBuffer::new();

    let outcome = run_with_output(args(dir.path(), true), out.clone()).await;
    assert!(matches!(outcome, Ok(None)));
    assert_eq!(exit_code(&outcome), 0);

    let text = out.contents();
    assert!(text.contains("jobs in topological order (4):"), "{text}");
    assert!(text.contains("after: [\"a\"]"), "{text}");
    assert!(text.contains("schema: build"), "{text}");
    assert!(!dir.path().join("out/records.jsonl").exists());
}

#[tokio::test]
async fn failing_upstream_cancels_dependents_and_persists_records() {
    init_tracing();
    let dir = pipeline_dir();
    let out = SharedBuffer::new();

    let outcome = with_timeout(run_with_output(args(dir.path(), false), out.clone())).await;
    assert_eq!(exit_code(&outcome), EXIT_RUN_FAILED);

    let summary = outcome.unwrap().unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(
        (summary.succeeded, summary.failed, summary.cancelled),
        (1, 1, 2)
    );
    assert!(summary.complete);
    assert!(!summary.successful);

    let records = json_lines(&fs::read_to_string(dir.path().join("out/records.jsonl")).unwrap());
    assert_eq!(records.len(), 3);
    let a_attempts: Vec<&Value> = records.iter().filter(|r| r["job"] == "a").collect();
    assert_eq!(a_attempts.len(), 2);
    assert!(a_attempts.iter().all(|r| r["outcome"]["result"] == "failed"));
    assert!(
        records
            .iter()
            .any(|r| r["job"] == "d" && r["outcome"]["result"] == "succeeded")
    );

    let events = json_lines(&out.contents());
    assert!(events.windows(2).all(|w| w[0]["seq"].as_u64() < w[1]["seq"].as_u64()));
    let finished: Vec<&Value> = events.iter().filter(|e| e["event"] == "run_finished").collect();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["summary"]["failed"], 1);
}

#[tokio::test]
async fn invalid_payload_fails_the_dry_run() {
    let dir = pipeline_dir();
    let broken = PIPELINE.replace("params = { target = \"debug\" }", "params = { target = 3 }");
    fs::write(dir.path().join("orchestrator.toml"), broken).unwrap();

    let outcome = run_with_output(args(dir.path(), true), SharedBuffer::new()).await;
    let err = outcome.as_ref().unwrap_err();
    assert!(format!("{err:#}").contains("expected string"), "{err:#}");
    assert_eq!(exit_code(&outcome), EXIT_ERROR);
}

#[tokio::test]
async fn missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_with_output(args(&dir.path().join("nope"), true), SharedBuffer::new()).await;
    assert_eq!(exit_code(&outcome), EXIT_ERROR);
}

#[tokio::test]
async fn shipped_config_passes_a_dry_run() {
    let out = SharedBuffer::new();
    let outcome = run_with_output(args(&shipped_config(), true), out.clone()).await;
    assert!(matches!(outcome, Ok(None)), "{outcome:?}");

    let text = out.contents();
    let position = |job: &str| text.find(&format!("  - {job}\n")).unwrap();
    assert!(position("prepare") < position("build"));
    assert!(position("build") < position("test"));
    assert!(position("test") < position("package"));
}

#[cfg(unix)]
#[tokio::test]
async fn shipped_config_runs_to_success() {
    init_tracing();
    let outcome = with_timeout(run_with_output(args(&shipped_config(), false), SharedBuffer::new())).await;
    let summary = outcome.unwrap().unwrap();
    assert!(summary.successful, "{summary:?}");
    assert_eq!(summary.succeeded, 4);
}
