//! `loadbay-orchestrator` -- locked single-run file-processing pipeline.
//!
//! Reads pending rows from the `file_registry` table, dispatches the
//! registered handler for each as a subprocess, and relocates handler
//! output into the load directory. Exactly one instance runs at a time,
//! enforced by a PostgreSQL advisory lock.
//!
//! Configuration is environment-driven; see
//! [`OrchestratorConfig::from_env`] for the variable table.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadbay_core::handlers::HandlerRegistry;
use loadbay_db::lock::PgRunLock;
use loadbay_db::repositories::task_repo::FileRegistryRepo;
use loadbay_orchestrator::config::OrchestratorConfig;
use loadbay_orchestrator::pipeline::{self, RunOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadbay_orchestrator=info,loadbay_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = OrchestratorConfig::from_env();

    let pool = loadbay_db::create_pool(&cfg.database_url)
        .await
        .context("failed to connect to the task store")?;

    let handlers = HandlerRegistry::load(&cfg.handler_manifest)
        .await
        .with_context(|| {
            format!(
                "failed to load handler manifest {}",
                cfg.handler_manifest.display()
            )
        })?;
    let missing = handlers.validate().await;
    tracing::info!(
        registered = handlers.len(),
        missing,
        "handler manifest loaded"
    );

    let registry = FileRegistryRepo::new(pool.clone());
    let mut lock = PgRunLock::connect(&pool, cfg.lock_key)
        .await
        .context("failed to check out the lock connection")?;

    match pipeline::run(&cfg, &registry, &handlers, &mut lock).await? {
        RunOutcome::LockBusy => {
            tracing::warn!("exiting without touching any task");
        }
        RunOutcome::NoTasks => {
            tracing::info!("nothing to do");
        }
        RunOutcome::Completed(report) => {
            tracing::info!(
                fetched = report.fetched,
                launched = report.launched,
                created = report.created,
                failed = report.failed,
                parked = report.parked,
                "run complete"
            );
        }
    }

    Ok(())
}
