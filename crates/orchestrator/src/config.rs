//! Orchestrator configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use loadbay_core::cleanup::CleanupStrategy;
use loadbay_core::collect::MovePolicy;

/// Process-wide configuration, constructed once at startup and passed to
/// every component. No ambient global state.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// PostgreSQL connection string for the task store.
    pub database_url: String,
    /// Directory receiving the registry snapshot.
    pub registry_dir: PathBuf,
    /// Directory handlers write their output into.
    pub staging_dir: PathBuf,
    /// Final destination for relocated output files.
    pub load_dir: PathBuf,
    /// Path of the JSON handler manifest.
    pub handler_manifest: PathBuf,
    /// Advisory-lock key scoped to this pipeline.
    pub lock_key: i64,
    /// Wall-clock timeout per handler invocation.
    pub handler_timeout: Duration,
    /// Staging purge policy applied before dispatch.
    pub cleanup: CleanupStrategy,
    /// Retry policy for output relocation.
    pub move_policy: MovePolicy,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default              |
    /// |-------------------------|----------------------|
    /// | `DATABASE_URL`          | -- (required)         |
    /// | `REGISTRY_DIR`          | `data/registry`      |
    /// | `STAGING_DIR`           | `data/staging`       |
    /// | `LOAD_DIR`              | `data/load`          |
    /// | `HANDLER_MANIFEST`      | `handlers.json`      |
    /// | `RUN_LOCK_KEY`          | `84215045`           |
    /// | `HANDLER_TIMEOUT_SECS`  | `1800`               |
    /// | `CLEANUP_STRATEGY`      | `age` (`age`\|`all`) |
    /// | `CLEANUP_OLDER_THAN_MIN`| `60`                 |
    /// | `MOVE_MAX_RETRIES`      | `5`                  |
    /// | `MOVE_RETRY_DELAY_SECS` | `4`                  |
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let registry_dir = path_var("REGISTRY_DIR", "data/registry");
        let staging_dir = path_var("STAGING_DIR", "data/staging");
        let load_dir = path_var("LOAD_DIR", "data/load");
        let handler_manifest = path_var("HANDLER_MANIFEST", "handlers.json");

        let lock_key: i64 = parse_var("RUN_LOCK_KEY", "84215045");
        let handler_timeout = Duration::from_secs(parse_var("HANDLER_TIMEOUT_SECS", "1800"));

        let strategy = std::env::var("CLEANUP_STRATEGY").unwrap_or_else(|_| "age".into());
        let older_than_min: u64 = parse_var("CLEANUP_OLDER_THAN_MIN", "60");
        let cleanup = CleanupStrategy::from_config(&strategy, older_than_min)
            .expect("CLEANUP_STRATEGY must be 'age' or 'all'");

        let move_policy = MovePolicy {
            max_retries: parse_var("MOVE_MAX_RETRIES", "5"),
            retry_delay: Duration::from_secs(parse_var("MOVE_RETRY_DELAY_SECS", "4")),
        };

        Self {
            database_url,
            registry_dir,
            staging_dir,
            load_dir,
            handler_manifest,
            lock_key,
            handler_timeout,
            cleanup,
            move_policy,
        }
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(name).unwrap_or_else(|_| default.into()))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid value: {e:?}"))
}
