// src/lib.rs

pub mod bus;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod schema;
pub mod types;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventFilter, RecordSink};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, ConfigStore, default_config_path};
use crate::dag::{JobGraph, RunSummary};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, Scheduler};
use crate::exec::{LocalBackend, spawn_heartbeats};
use crate::schema::SchemaRegistry;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and schema loading
/// - the event bus (optional record log, optional JSON event stream)
/// - scheduler / core / runtime
/// - the local worker backend and its heartbeats
/// - Ctrl-C handling
///
/// Returns `None` for a dry run.
pub async fn run(args: CliArgs) -> Result<Option<RunSummary>> {
    run_with_output(args, std::io::stdout()).await
}

/// Exit status for the outcome of [`run`]: 0 on success or dry run, 1 on
/// error, 2 when the run finished with a failed job.
pub fn exit_code(outcome: &Result<Option<RunSummary>>) -> i32 {
    match outcome {
        Ok(Some(summary)) if !summary.successful => EXIT_RUN_FAILED,
        Ok(_) => 0,
        Err(_) => EXIT_ERROR,
    }
}

pub const EXIT_ERROR: i32 = 1;
pub const EXIT_RUN_FAILED: i32 = 2;

/// Like [`run`], with dry-run output and `--emit-events` lines written to
/// `out` instead of stdout.
pub async fn run_with_output<W>(args: CliArgs, mut out: W) -> Result<Option<RunSummary>>
where
    W: Write + Send + 'static,
{
    let config_path = args
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let store = ConfigStore::new(config::load(&config_path)?);
    let cfg = store.snapshot();

    let schemas_dir = args
        .schemas
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.schemas_dir());
    let schemas = load_schemas(&schemas_dir)?;

    if args.dry_run {
        print_dry_run(&cfg, &schemas, &mut out)?;
        return Ok(None);
    }

    let mut bus = EventBus::new();
    if let Some(path) = cfg.record_log_path() {
        let sink = RecordSink::open(&path)?;
        info!(path = %path.display(), "persisting execution records");
        bus = bus.with_record_sink(sink);
    }

    let printer = args.emit_events.then(|| spawn_event_printer(&bus, out));

    let scheduler = Scheduler::from_config(&cfg, Arc::new(schemas), bus.clone(), Instant::now())?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let heartbeats = spawn_heartbeats(
        cfg.worker.keys().cloned().collect(),
        cfg.heartbeat_interval(),
        rt_tx.clone(),
    );

    // Ctrl-C → shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(
        jobs = cfg.job.len(),
        workers = cfg.worker.len(),
        "starting orchestration run"
    );

    let core = CoreRuntime::new(scheduler);
    let runtime = Runtime::new(
        core,
        rt_tx,
        rt_rx,
        Arc::new(LocalBackend::new()),
        cfg.tick_interval(),
    );
    let summary = runtime.run().await?;

    heartbeats.abort();
    bus.close();
    if let Some(printer) = printer {
        if let Err(err) = printer.await {
            warn!(error = %err, "event printer task failed");
        }
    }

    Ok(Some(summary))
}

/// Load the schema registry, or an empty one if `dir` does not exist.
fn load_schemas(dir: &Path) -> Result<SchemaRegistry> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "schema directory not found; jobs must not reference schemas");
        return Ok(SchemaRegistry::default());
    }
    Ok(SchemaRegistry::load_dir(dir)?)
}

/// Write every bus event as one JSON line to `out` until the bus closes.
fn spawn_event_printer<W>(bus: &EventBus, mut out: W) -> tokio::task::JoinHandle<()>
where
    W: Write + Send + 'static,
{
    let mut sub = bus.subscribe(EventFilter::All);
    tokio::spawn(async move {
        while let Some(event) = sub.next().await {
            let written = serde_json::to_writer(&mut out, &event)
                .map_err(std::io::Error::from)
                .and_then(|()| writeln!(out));
            if let Err(err) = written {
                warn!(seq = event.seq, error = %err, "could not write event");
            }
        }
        if let Err(err) = out.flush() {
            warn!(error = %err, "could not flush event output");
        }
    })
}

/// Validate the graph and every payload, then print jobs in dispatch order.
fn print_dry_run(cfg: &ConfigFile, schemas: &SchemaRegistry, out: &mut impl Write) -> Result<()> {
    let specs = cfg.job_specs();
    schemas.check_references(&specs)?;
    let graph = JobGraph::build(specs)?;
    for job in graph.jobs() {
        schemas.validate_job(job.spec())?;
    }

    writeln!(out, "orchestrator dry-run")?;
    writeln!(
        out,
        "  tick_interval_ms = {}, max_in_flight = {}",
        cfg.orchestrator.tick_interval_ms, cfg.orchestrator.max_in_flight
    )?;
    writeln!(
        out,
        "  retry: max_retries = {}, base_backoff_ms = {}, multiplier = {}",
        cfg.retry.max_retries, cfg.retry.base_backoff_ms, cfg.retry.multiplier
    )?;
    writeln!(out)?;

    writeln!(out, "workers ({}):", cfg.worker.len())?;
    for (id, worker) in &cfg.worker {
        writeln!(
            out,
            "  - {id} (capacity {}, capabilities {:?})",
            worker.capacity, worker.capabilities
        )?;
    }
    writeln!(out)?;

    writeln!(out, "jobs in topological order ({}):", graph.len())?;
    for id in graph.topological_order() {
        let Some(job) = graph.get(id) else { continue };
        let spec = job.spec();
        writeln!(out, "  - {id}")?;
        let deps = graph.dependencies_of(id);
        if !deps.is_empty() {
            writeln!(out, "      after: {deps:?}")?;
        }
        if let Some(schema) = &spec.schema {
            writeln!(out, "      schema: {schema}")?;
        }
        if !spec.requires.is_empty() {
            writeln!(out, "      requires: {:?}", spec.requires)?;
        }
        writeln!(out, "      task: {:?}", spec.task)?;
    }
    out.flush()?;

    debug!("dry-run complete (no execution)");
    Ok(())
}
