//! The pipeline coordinator: one locked, strictly sequential run.
//!
//! Lock first -- a second instance that fails the try-acquire performs
//! zero registry or filesystem writes. After that: purge staging, fetch
//! and snapshot the pending rows, then walk them in intake order. A
//! task's failure is recorded on its row and never aborts the batch;
//! only the lock refusal aborts the whole run.

use std::time::SystemTime;

use tokio::fs;

use loadbay_core::cleanup;
use loadbay_core::collect::{self, RelocateOutcome};
use loadbay_core::dispatch::executor::{tail, HandlerInput, HandlerOutput, TAIL_CHARS};
use loadbay_core::dispatch::runner::{self, DispatchOutcome};
use loadbay_core::error::CoreError;
use loadbay_core::handlers::HandlerRegistry;
use loadbay_core::lock::RunLock;
use loadbay_core::registry::{PendingTask, TaskRegistry};
use loadbay_core::snapshot;
use loadbay_core::task::{FailureReason, Task, TaskStatus};
use loadbay_core::types::DbId;

use crate::config::OrchestratorConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run-level failures that abort the invocation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("run lock error: {0}")]
    Lock(#[source] BoxError),

    #[error("registry error: {0}")]
    Registry(#[source] BoxError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] CoreError),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Another instance holds the run lock; nothing was touched.
    LockBusy,
    /// The registry had no pending rows; the sentinel snapshot was written.
    NoTasks,
    /// The per-task loop ran to completion.
    Completed(RunReport),
}

/// End-of-run summary for operator reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Pending rows fetched from the registry.
    pub fetched: usize,
    /// Tasks whose handler was actually launched.
    pub launched: usize,
    /// Tasks that reached CREATED.
    pub created: usize,
    /// Tasks that reached ERROR.
    pub failed: usize,
    /// Tasks parked in PROCESSING with NO_SCRIPT_FOUND.
    pub parked: usize,
}

/// Terminal state of one task within this run.
enum TaskFate {
    Parked,
    Created,
    Failed,
}

/// Execute one orchestrator run.
pub async fn run<R, L>(
    cfg: &OrchestratorConfig,
    registry: &R,
    handlers: &HandlerRegistry,
    lock: &mut L,
) -> Result<RunOutcome, PipelineError>
where
    R: TaskRegistry,
    L: RunLock,
{
    match lock.try_acquire().await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("another orchestrator instance is already running");
            return Ok(RunOutcome::LockBusy);
        }
        Err(e) => return Err(PipelineError::Lock(Box::new(e))),
    }
    tracing::info!("run lock acquired");

    let outcome = execute(cfg, registry, handlers).await;

    // The lock connection would release on teardown anyway, but an explicit
    // unlock keeps the window for the next run as small as possible.
    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "failed to release run lock");
    } else {
        tracing::info!("run lock released");
    }

    outcome
}

/// Everything between lock acquisition and release.
async fn execute<R: TaskRegistry>(
    cfg: &OrchestratorConfig,
    registry: &R,
    handlers: &HandlerRegistry,
) -> Result<RunOutcome, PipelineError> {
    let run_started_at = SystemTime::now();

    for dir in [&cfg.registry_dir, &cfg.staging_dir, &cfg.load_dir] {
        fs::create_dir_all(dir).await?;
    }

    let removed = cleanup::purge_staging(&cfg.staging_dir, cfg.cleanup).await?;
    tracing::info!(
        removed,
        staging = %cfg.staging_dir.display(),
        "staging directory purged"
    );

    let tasks = registry
        .fetch_pending()
        .await
        .map_err(|e| PipelineError::Registry(Box::new(e)))?;

    if tasks.is_empty() {
        let path = snapshot::write_empty(&cfg.registry_dir).await?;
        tracing::info!(snapshot = %path.display(), "no pending tasks");
        return Ok(RunOutcome::NoTasks);
    }

    let pending: Vec<PendingTask> = tasks
        .into_iter()
        .map(|task| {
            let handler = handlers
                .resolve(&task.data_provider, &task.client_name)
                .cloned();
            PendingTask { task, handler }
        })
        .collect();

    let path = snapshot::write(&cfg.registry_dir, &pending).await?;
    tracing::info!(
        snapshot = %path.display(),
        rows = pending.len(),
        "registry snapshot written"
    );

    let mut report = RunReport {
        fetched: pending.len(),
        ..Default::default()
    };

    for entry in &pending {
        match process_task(cfg, registry, entry, run_started_at).await? {
            TaskFate::Parked => report.parked += 1,
            TaskFate::Created => {
                report.launched += 1;
                report.created += 1;
            }
            TaskFate::Failed => {
                report.launched += 1;
                report.failed += 1;
            }
        }
    }

    if report.launched == 0 {
        tracing::info!("no handlers launched (every task parked as NO_SCRIPT_FOUND)");
    }

    Ok(RunOutcome::Completed(report))
}

/// Drive one task through resolve → dispatch → collect.
async fn process_task<R: TaskRegistry>(
    cfg: &OrchestratorConfig,
    registry: &R,
    entry: &PendingTask,
    run_started_at: SystemTime,
) -> Result<TaskFate, PipelineError> {
    let task = &entry.task;

    // A registered handler whose file has since vanished is parked the
    // same way as an unregistered pair: no subprocess, reason recorded,
    // picked up again once the path reappears.
    let handler = match &entry.handler {
        Some(spec) if fs::try_exists(&spec.path).await.unwrap_or(false) => spec,
        _ => {
            tracing::warn!(
                task_id = task.id,
                provider = %task.data_provider,
                client = %task.client_name,
                "no handler for task; parking with NO_SCRIPT_FOUND"
            );
            registry
                .update_status(task.id, TaskStatus::Processing, Some(&FailureReason::NoScriptFound))
                .await
                .map_err(|e| PipelineError::Registry(Box::new(e)))?;
            return Ok(TaskFate::Parked);
        }
    };

    registry
        .update_status(task.id, TaskStatus::Processing, None)
        .await
        .map_err(|e| PipelineError::Registry(Box::new(e)))?;
    tracing::info!(
        task_id = task.id,
        handler = %handler.path.display(),
        "launching handler"
    );

    let input = HandlerInput {
        env_vars: runner::task_env(task),
        working_directory: None,
        timeout: cfg.handler_timeout,
    };

    match runner::run(handler, input).await {
        DispatchOutcome::Succeeded(output) => {
            log_stream_tails(task.id, &output);
            collect_outputs(cfg, registry, task, output.parsed_output.as_ref(), run_started_at)
                .await
        }
        DispatchOutcome::Failed { reason, output } => {
            if let Some(output) = &output {
                log_stream_tails(task.id, output);
            }
            tracing::warn!(task_id = task.id, reason = %reason, "handler failed");
            registry
                .update_status(task.id, TaskStatus::Error, Some(&reason))
                .await
                .map_err(|e| PipelineError::Registry(Box::new(e)))?;
            Ok(TaskFate::Failed)
        }
    }
}

/// Locate the handler's output files and move them into the load dir.
async fn collect_outputs<R: TaskRegistry>(
    cfg: &OrchestratorConfig,
    registry: &R,
    task: &Task,
    parsed_output: Option<&serde_json::Value>,
    run_started_at: SystemTime,
) -> Result<TaskFate, PipelineError> {
    // Manifest first; the filename scan with its freshness filter is the
    // compatibility fallback for handlers that declare nothing.
    let mut candidates = collect::manifest_outputs(parsed_output, &cfg.staging_dir).await;
    if candidates.is_empty() {
        candidates = collect::discover(&cfg.staging_dir, task.id, Some(run_started_at)).await?;
    }
    if candidates.is_empty() {
        candidates = collect::discover(&cfg.staging_dir, task.id, None).await?;
    }

    if candidates.is_empty() {
        tracing::warn!(
            task_id = task.id,
            staging = %cfg.staging_dir.display(),
            "handler succeeded but produced no output files"
        );
        registry
            .update_status(task.id, TaskStatus::Error, Some(&FailureReason::NoOutputFile))
            .await
            .map_err(|e| PipelineError::Registry(Box::new(e)))?;
        return Ok(TaskFate::Failed);
    }

    let mut moved = 0usize;
    let mut last_reason = None;
    for src in &candidates {
        match collect::relocate(src, &cfg.load_dir, &cfg.move_policy).await {
            Ok(RelocateOutcome::Moved(dst)) => {
                moved += 1;
                tracing::info!(
                    task_id = task.id,
                    from = %src.display(),
                    to = %dst.display(),
                    "output relocated"
                );
            }
            Ok(RelocateOutcome::AlreadyPresent(dst)) => {
                moved += 1;
                tracing::info!(
                    task_id = task.id,
                    destination = %dst.display(),
                    "output already present; nothing moved"
                );
            }
            Err(e) => {
                tracing::warn!(
                    task_id = task.id,
                    file = %src.display(),
                    error = %e,
                    "failed to relocate output"
                );
                last_reason = Some(FailureReason::from(&e));
            }
        }
    }

    if moved > 0 {
        registry
            .update_status(task.id, TaskStatus::Created, None)
            .await
            .map_err(|e| PipelineError::Registry(Box::new(e)))?;
        tracing::info!(task_id = task.id, moved, "task complete");
        Ok(TaskFate::Created)
    } else {
        let reason = last_reason.unwrap_or(FailureReason::NoOutputFile);
        registry
            .update_status(task.id, TaskStatus::Error, Some(&reason))
            .await
            .map_err(|e| PipelineError::Registry(Box::new(e)))?;
        Ok(TaskFate::Failed)
    }
}

/// Bounded stdout/stderr tails for operator diagnostics; full streams are
/// never persisted.
fn log_stream_tails(task_id: DbId, output: &HandlerOutput) {
    if !output.stdout.is_empty() {
        tracing::info!(
            task_id,
            stdout = tail(&output.stdout, TAIL_CHARS),
            "handler stdout tail"
        );
    }
    if !output.stderr.is_empty() {
        tracing::warn!(
            task_id,
            stderr = tail(&output.stderr, TAIL_CHARS),
            "handler stderr tail"
        );
    }
}
