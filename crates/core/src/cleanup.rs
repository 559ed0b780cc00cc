//! Staging-directory purge applied before each run.
//!
//! Ambient leftovers from a previous (possibly crashed) run would
//! otherwise be picked up by output discovery and misattributed to a new
//! task. The purge removes either everything or only files older than a
//! retention window; per-file removal failures are logged and skipped.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs;

use crate::error::CoreError;

/// Strategy name for [`CleanupStrategy::All`].
pub const STRATEGY_ALL: &str = "all";
/// Strategy name for [`CleanupStrategy::OlderThan`].
pub const STRATEGY_AGE: &str = "age";

/// Which staging files to remove before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStrategy {
    /// Remove every regular file.
    All,
    /// Remove only files whose mtime is older than the window.
    OlderThan(Duration),
}

impl CleanupStrategy {
    /// Parse the configured strategy name plus retention window.
    pub fn from_config(strategy: &str, older_than_min: u64) -> Result<Self, CoreError> {
        match strategy {
            STRATEGY_ALL => Ok(Self::All),
            STRATEGY_AGE => Ok(Self::OlderThan(Duration::from_secs(older_than_min * 60))),
            other => Err(CoreError::Validation(format!(
                "Unknown cleanup strategy: '{other}'. Valid strategies: {STRATEGY_ALL}, {STRATEGY_AGE}"
            ))),
        }
    }
}

/// Remove staging files per `strategy`, returning how many were removed.
///
/// Only regular files are touched; subdirectories are left alone.
pub async fn purge_staging(dir: &Path, strategy: CleanupStrategy) -> io::Result<usize> {
    let cutoff = match strategy {
        CleanupStrategy::All => None,
        CleanupStrategy::OlderThan(window) => Some(SystemTime::now() - window),
    };

    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if let Some(cutoff) = cutoff {
            match metadata.modified() {
                Ok(modified) if modified < cutoff => {}
                _ => continue,
            }
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(
                    file = %entry.path().display(),
                    error = %e,
                    "failed to remove stale staging file"
                );
            }
        }
    }

    Ok(removed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_known_names() {
        assert_eq!(
            CleanupStrategy::from_config("all", 60).unwrap(),
            CleanupStrategy::All
        );
        assert_eq!(
            CleanupStrategy::from_config("age", 60).unwrap(),
            CleanupStrategy::OlderThan(Duration::from_secs(3600))
        );
    }

    #[test]
    fn strategy_rejects_unknown_names() {
        assert!(CleanupStrategy::from_config("newest", 60).is_err());
        assert!(CleanupStrategy::from_config("", 60).is_err());
    }

    #[tokio::test]
    async fn purge_all_removes_files_but_not_dirs() {
        let staging = tempfile::tempdir().expect("tempdir");
        fs::write(staging.path().join("stale.csv"), b"x")
            .await
            .expect("write");
        fs::write(staging.path().join("stale2.csv"), b"y")
            .await
            .expect("write");
        fs::create_dir(staging.path().join("keepdir"))
            .await
            .expect("mkdir");

        let removed = purge_staging(staging.path(), CleanupStrategy::All)
            .await
            .expect("purge");

        assert_eq!(removed, 2);
        assert!(staging.path().join("keepdir").is_dir());
    }

    #[tokio::test]
    async fn purge_age_keeps_recent_files() {
        let staging = tempfile::tempdir().expect("tempdir");
        fs::write(staging.path().join("fresh.csv"), b"x")
            .await
            .expect("write");

        let removed = purge_staging(
            staging.path(),
            CleanupStrategy::OlderThan(Duration::from_secs(3600)),
        )
        .await
        .expect("purge");

        assert_eq!(removed, 0);
        assert!(staging.path().join("fresh.csv").exists());
    }

    #[tokio::test]
    async fn purge_age_removes_files_past_the_window() {
        let staging = tempfile::tempdir().expect("tempdir");
        fs::write(staging.path().join("old.csv"), b"x")
            .await
            .expect("write");
        // Make sure the file's mtime falls behind a zero-length window.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let removed = purge_staging(
            staging.path(),
            CleanupStrategy::OlderThan(Duration::ZERO),
        )
        .await
        .expect("purge");

        assert_eq!(removed, 1);
    }
}
