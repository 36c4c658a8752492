// tests/scheduler_workers.rs

use std::time::Duration;

use tokio::time::Instant;

use orchestrator::bus::{EventKind, RecordOutcome, StatusCause};
use orchestrator::dag::JobSpec;
use orchestrator::engine::{Outcome, WorkerPool};
use orchestrator::types::{JobStatus, WorkerHealth};
use orchestrator_test_utils::builders::SchedulerBuilder;
use orchestrator_test_utils::init_tracing;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn least_loaded_worker_wins() {
    let now = Instant::now();
    let mut pool = WorkerPool::new(secs(1.5), secs(3.0));
    pool.register("w1", ["linux".to_string()], 4, now);
    pool.register("w2", ["linux".to_string()], 4, now);

    pool.set_load("w1", 2);
    assert_eq!(pool.select(&["linux".to_string()]), Some("w2"));

    // ties go to registration order
    pool.set_load("w2", 2);
    assert_eq!(pool.select(&[]), Some("w1"));
}

#[test]
fn full_and_incapable_workers_are_skipped() {
    let now = Instant::now();
    let mut pool = WorkerPool::new(secs(1.5), secs(3.0));
    pool.register("cpu", Vec::<String>::new(), 1, now);
    pool.register("gpu", ["gpu".to_string()], 1, now);

    assert_eq!(pool.select(&["gpu".to_string()]), Some("gpu"));

    pool.acquire("gpu");
    assert_eq!(pool.select(&["gpu".to_string()]), None);
    assert_eq!(pool.select(&[]), Some("cpu"));

    pool.release("gpu");
    assert_eq!(pool.get("gpu").unwrap().load(), 0);
}

#[test]
fn healthy_workers_are_preferred_over_degraded_ones() {
    let t0 = Instant::now();
    let mut pool = WorkerPool::new(secs(1.0), secs(3.0));
    pool.register("w1", Vec::<String>::new(), 4, t0);
    pool.register("w2", Vec::<String>::new(), 4, t0);
    pool.set_load("w2", 3);

    let t1 = t0 + secs(2.0);
    pool.heartbeat("w2", t1);
    let changes = pool.refresh_health(t1);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].worker, "w1");
    assert_eq!(changes[0].to, WorkerHealth::Degraded);

    assert_eq!(pool.select(&[]), Some("w2"));

    let back = pool.heartbeat("w1", t1).expect("degraded -> healthy is a change");
    assert_eq!(back.to, WorkerHealth::Healthy);
    assert_eq!(pool.select(&[]), Some("w1"));
}

#[test]
fn scheduler_spreads_ready_jobs_by_load() {
    let t0 = Instant::now();
    let (mut s, _bus) = SchedulerBuilder::new()
        .job(JobSpec::new("a"))
        .job(JobSpec::new("b"))
        .job(JobSpec::new("c"))
        .worker("w1", 3, &[])
        .worker("w2", 3, &[])
        .build(t0);

    let placed: Vec<(String, String)> = s
        .tick(t0)
        .into_iter()
        .map(|d| (d.task.job, d.worker))
        .collect();

    assert_eq!(
        placed,
        vec![
            ("a".to_string(), "w1".to_string()),
            ("b".to_string(), "w2".to_string()),
            ("c".to_string(), "w1".to_string()),
        ]
    );
    assert_eq!(s.pool().get("w1").unwrap().load(), 2);
    assert_eq!(s.pool().get("w2").unwrap().load(), 1);
}

#[test]
fn capability_requirements_route_jobs() {
    let t0 = Instant::now();
    let (mut s, _bus) = SchedulerBuilder::new()
        .job(JobSpec::new("train").requires("gpu"))
        .job(JobSpec::new("quantum").requires("qpu"))
        .worker("cpu", 2, &["linux"])
        .worker("gpu", 2, &["linux", "gpu"])
        .build(t0);

    let dispatched = s.tick(t0);
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].task.job, "train");
    assert_eq!(dispatched[0].worker, "gpu");

    // nobody can run it; it waits in the queue rather than failing
    assert_eq!(s.status("quantum"), Some(JobStatus::Ready));
    assert_eq!(s.queued(), vec!["quantum"]);
}

#[test]
fn max_in_flight_caps_dispatch_and_keeps_queue_order() {
    let t0 = Instant::now();
    let (mut s, _bus) = SchedulerBuilder::new()
        .job(JobSpec::new("j1"))
        .job(JobSpec::new("j2"))
        .job(JobSpec::new("j3"))
        .worker("w1", 8, &[])
        .max_in_flight(1)
        .build(t0);

    let first = s.tick(t0);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].task.job, "j1");
    assert_eq!(s.queued(), vec!["j2", "j3"]);
    assert_eq!(s.in_flight_count(), 1);

    s.handle_completion("j1", 1, "w1", Outcome::Succeeded, t0);
    let second = s.tick(t0);
    assert_eq!(second[0].task.job, "j2");
    assert_eq!(s.queued(), vec!["j3"]);
}

#[test]
fn lost_worker_requeues_job_once_then_applies_retry_policy() {
    init_tracing();
    let t0 = Instant::now();
    let (mut s, bus) = SchedulerBuilder::new()
        .job(JobSpec::new("A"))
        .worker("w1", 1, &[])
        .worker("w2", 1, &[])
        .heartbeat_windows(secs(1.5), secs(3.0))
        .max_retries(2)
        .build(t0);

    let first = s.tick(t0);
    assert_eq!(first[0].worker, "w1");
    let first_cancel = first[0].task.cancel.clone();

    // w1 goes quiet, w2 keeps beating.
    let t1 = t0 + secs(2.0);
    s.heartbeat("w2", t1);
    assert!(s.tick(t1).is_empty());
    assert_eq!(s.pool().get("w1").unwrap().health(), WorkerHealth::Degraded);
    assert_eq!(s.status("A"), Some(JobStatus::Running));

    // Past the timeout: w1 is unreachable and A moves to w2 without using a retry.
    let t2 = t0 + secs(3.5);
    s.heartbeat("w2", t2);
    let moved = s.tick(t2);
    assert_eq!(s.pool().get("w1").unwrap().health(), WorkerHealth::Unreachable);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].worker, "w2");
    assert_eq!(moved[0].task.attempt, 2);
    assert_eq!(s.graph().get("A").unwrap().retry_count(), 0);
    assert!(first_cancel.is_raised());

    // A late result from the lost attempt changes nothing.
    s.handle_completion("A", 1, "w1", Outcome::Succeeded, t2);
    assert_eq!(s.status("A"), Some(JobStatus::Running));
    assert_eq!(s.assigned_worker("A"), Some("w2"));

    // w2 is lost as well: this time the loss counts against the retry budget.
    let t3 = t2 + secs(3.1);
    assert!(s.tick(t3).is_empty());
    assert_eq!(s.status("A"), Some(JobStatus::Pending));
    assert_eq!(s.graph().get("A").unwrap().retry_count(), 1);
    let retry_at = s.backoff_until("A").expect("backoff after second loss");

    // w1 comes back and picks the job up after the backoff.
    s.heartbeat("w1", retry_at);
    let third = s.tick(retry_at);
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].worker, "w1");
    assert_eq!(third[0].task.attempt, 3);

    let lost_causes = bus
        .events()
        .iter()
        .filter(|e| {
            matches!(
                &e.kind,
                EventKind::JobStatusChanged { cause: Some(StatusCause::WorkerLost { .. }), .. }
            )
        })
        .count();
    assert_eq!(lost_causes, 1, "only the first loss is a free requeue");

    let lost_records = bus
        .records()
        .iter()
        .filter(|r| r.outcome == RecordOutcome::WorkerLost)
        .count();
    assert_eq!(lost_records, 2);

    let health_events: Vec<(String, WorkerHealth)> = bus
        .events()
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::WorkerHealthChanged { worker, to, .. } => Some((worker.clone(), *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        health_events,
        vec![
            ("w1".to_string(), WorkerHealth::Degraded),
            ("w1".to_string(), WorkerHealth::Unreachable),
            ("w2".to_string(), WorkerHealth::Unreachable),
            ("w1".to_string(), WorkerHealth::Healthy),
        ]
    );
}
