// tests/scheduler_cancel.rs

use tokio::time::Instant;

use orchestrator::bus::{EventKind, RecordOutcome, StatusCause};
use orchestrator::dag::JobSpec;
use orchestrator::engine::{CoreCommand, CoreRuntime, Outcome, RuntimeEvent};
use orchestrator::errors::OrchestratorError;
use orchestrator::schema::{RawSchemaFile, SchemaRegistry};
use orchestrator::types::JobStatus;
use orchestrator_test_utils::builders::SchedulerBuilder;

fn chain_plus_independent() -> SchedulerBuilder {
    // A -> B -> C, and D on its own
    SchedulerBuilder::new()
        .job(JobSpec::new("A"))
        .job(JobSpec::new("B").after("A"))
        .job(JobSpec::new("C").after("B"))
        .job(JobSpec::new("D"))
        .worker("w1", 4, &[])
}

#[test]
fn cancel_running_job_cancels_downstream_and_discards_late_result() {
    let t0 = Instant::now();
    let (mut s, bus) = chain_plus_independent().build(t0);

    let dispatched = s.tick(t0);
    assert_eq!(dispatched.len(), 2);
    let a = dispatched.iter().find(|d| d.task.job == "A").unwrap();

    let cancelled = s.cancel("A").unwrap();
    assert_eq!(cancelled, vec!["A", "B", "C"]);
    assert!(a.task.cancel.is_raised());
    assert_eq!(s.status("D"), Some(JobStatus::Running));

    // worker slot stays taken until the attempt reports back
    assert_eq!(s.pool().get("w1").unwrap().load(), 2);

    s.handle_completion("A", 1, "w1", Outcome::Succeeded, t0);
    assert_eq!(s.status("A"), Some(JobStatus::Cancelled), "result is discarded");
    assert_eq!(s.pool().get("w1").unwrap().load(), 1);

    s.handle_completion("D", 1, "w1", Outcome::Succeeded, t0);
    assert!(s.is_finished());

    let discarded: Vec<_> = bus
        .records()
        .into_iter()
        .filter(|r| r.outcome == RecordOutcome::Discarded)
        .collect();
    assert_eq!(discarded.len(), 1);
    assert_eq!(discarded[0].job, "A");

    let summary = s.summary();
    assert_eq!((summary.succeeded, summary.cancelled), (1, 3));
    assert!(summary.successful, "cancellations alone do not fail a run");
}

#[test]
fn cancel_of_pending_job_leaves_upstream_alone() {
    let t0 = Instant::now();
    let (mut s, bus) = chain_plus_independent().build(t0);
    s.tick(t0);

    assert_eq!(s.cancel("B").unwrap(), vec!["B", "C"]);
    assert_eq!(s.status("A"), Some(JobStatus::Running));

    let causes: Vec<(String, StatusCause)> = bus
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::JobStatusChanged { job, to: JobStatus::Cancelled, cause: Some(cause), .. } => {
                Some((job, cause))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        causes,
        vec![
            ("B".to_string(), StatusCause::CancelRequested),
            (
                "C".to_string(),
                StatusCause::CancellationPropagated { upstream: "B".to_string() }
            ),
        ]
    );
}

#[test]
fn cancel_is_a_no_op_on_terminal_jobs_and_rejects_unknown_ones() {
    let t0 = Instant::now();
    let (mut s, _bus) = chain_plus_independent().build(t0);
    s.tick(t0);
    s.handle_completion("D", 1, "w1", Outcome::Succeeded, t0);

    assert!(s.cancel("D").unwrap().is_empty());
    assert_eq!(s.status("D"), Some(JobStatus::Succeeded));

    let err = s.cancel("nope").unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownJob(ref j) if j == "nope"));
}

#[test]
fn shutdown_event_cancels_everything_and_stops_the_core() {
    let t0 = Instant::now();
    let (s, _bus) = chain_plus_independent().build(t0);
    let mut core = CoreRuntime::new(s);

    let step = core.on_tick(t0);
    assert!(step.keep_running);
    assert_eq!(step.dispatches().count(), 2);

    let step = core.step(RuntimeEvent::ShutdownRequested, t0);
    assert!(!step.keep_running);
    assert!(matches!(step.commands.as_slice(), [CoreCommand::RequestExit]));

    let summary = core.summary();
    assert!(summary.complete);
    assert_eq!(summary.cancelled, 4);
}

#[test]
fn cancel_event_through_core_keeps_running_other_jobs() {
    let t0 = Instant::now();
    let (s, _bus) = chain_plus_independent().build(t0);
    let mut core = CoreRuntime::new(s);
    core.on_tick(t0);

    let step = core.step(RuntimeEvent::CancelJob { job: "A".into() }, t0);
    assert!(step.keep_running);

    let step = core.step(
        RuntimeEvent::AttemptFinished {
            job: "D".into(),
            attempt: 1,
            worker: "w1".into(),
            outcome: Outcome::Succeeded,
        },
        t0,
    );
    assert!(step.keep_running, "A's attempt is still outstanding");

    let step = core.step(
        RuntimeEvent::AttemptFinished {
            job: "A".into(),
            attempt: 1,
            worker: "w1".into(),
            outcome: Outcome::Failed("interrupted".into()),
        },
        t0,
    );
    assert!(!step.keep_running);
    assert!(core.is_finished());
}

fn build_schema() -> SchemaRegistry {
    let raw: RawSchemaFile = toml::from_str(
        r#"
[schema.build.fields.target]
type = "string"
required = true
"#,
    )
    .unwrap();
    SchemaRegistry::from_definitions(raw.schema).unwrap()
}

#[test]
fn invalid_payload_fails_job_without_dispatch_or_retry() {
    let t0 = Instant::now();
    let (mut s, bus) = SchedulerBuilder::new()
        .job(JobSpec::new("compile").schema("build"))
        .job(JobSpec::new("package").after("compile"))
        .job(JobSpec::new("ok").schema("build").param("target", "release"))
        .worker("w1", 4, &[])
        .max_retries(3)
        .schemas(build_schema())
        .build(t0);

    let dispatched = s.tick(t0);
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].task.job, "ok");
    assert_eq!(
        dispatched[0].task.payload.values.get("target"),
        Some(&toml::Value::String("release".into()))
    );

    assert_eq!(s.status("compile"), Some(JobStatus::Failed));
    assert_eq!(s.status("package"), Some(JobStatus::Cancelled));
    assert!(s.backoff_until("compile").is_none());

    let rejected = bus
        .records()
        .into_iter()
        .find(|r| r.job == "compile")
        .unwrap();
    assert!(rejected.worker.is_none());
    match rejected.outcome {
        RecordOutcome::Rejected { reason } => assert!(reason.contains("target"), "reason: {reason}"),
        other => panic!("expected Rejected, got {other:?}"),
    }
}
