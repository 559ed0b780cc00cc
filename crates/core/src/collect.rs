//! Output discovery and relocation into the load directory.
//!
//! After a handler succeeds, its output files are located in the staging
//! directory -- preferably from the manifest printed on the handler's
//! stdout, otherwise by scanning for filenames correlating the task id --
//! and moved into the load directory with hash-based idempotence and
//! bounded retry on transient failures.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use regex::RegexBuilder;
use tokio::fs;

use crate::hashing;
use crate::task::FailureReason;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry policy for a single file move.
#[derive(Debug, Clone, Copy)]
pub struct MovePolicy {
    /// Attempts before a persistent transient failure becomes `Locked`.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for MovePolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(4),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a relocation failed.
#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    /// Transient failures persisted through every retry attempt.
    #[error("file stayed locked through all retry attempts")]
    Locked,
    /// The destination path exceeds filesystem limits.
    #[error("destination path too long")]
    PathTooLong,
    /// The destination volume is full.
    #[error("destination volume is full")]
    NoSpace,
    /// Any other I/O failure, surfaced on first occurrence.
    #[error("relocation failed: {0}")]
    Io(#[source] io::Error),
}

impl From<&RelocateError> for FailureReason {
    fn from(err: &RelocateError) -> Self {
        match err {
            RelocateError::Locked => FailureReason::Locked,
            RelocateError::PathTooLong => FailureReason::PathTooLong,
            RelocateError::NoSpace => FailureReason::NoSpace,
            RelocateError::Io(e) => FailureReason::Io(
                e.raw_os_error()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| e.kind().to_string()),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Scan `staging_dir` for regular files whose name embeds `id{task_id}`
/// delimited by a non-alphanumeric boundary or the string edge,
/// case-insensitively.
///
/// With `since` set, only files modified at or after it are returned --
/// the freshness filter that keeps stale leftovers of earlier runs from
/// being attributed to this task. Callers retry without `since` before
/// giving up (clock skew, legitimately pre-existing output).
pub async fn discover(
    staging_dir: &Path,
    task_id: DbId,
    since: Option<SystemTime>,
) -> io::Result<Vec<PathBuf>> {
    if !fs::try_exists(staging_dir).await? {
        return Ok(Vec::new());
    }

    let pattern = RegexBuilder::new(&format!(
        r"(?:^|[^0-9a-z])id{task_id}(?:[^0-9a-z]|$)"
    ))
    .case_insensitive(true)
    .build()
    .expect("id pattern is valid");

    let mut found = Vec::new();
    let mut entries = fs::read_dir(staging_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        // Files vanishing mid-scan are skipped, not fatal.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if let Some(since) = since {
            match metadata.modified() {
                Ok(modified) if modified >= since => {}
                _ => continue,
            }
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if pattern.is_match(name) {
            found.push(entry.path());
        }
    }

    found.sort();
    Ok(found)
}

/// File names declared by the handler's stdout manifest
/// (`{"outputs": ["name", ...]}`), resolved against the staging directory.
///
/// The manifest names files, it does not address them: entries containing
/// path separators or `..`, and names missing from staging, are skipped
/// with a warning.
pub async fn manifest_outputs(
    parsed: Option<&serde_json::Value>,
    staging_dir: &Path,
) -> Vec<PathBuf> {
    let Some(names) = parsed
        .and_then(|value| value.get("outputs"))
        .and_then(|value| value.as_array())
    else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for name in names {
        let Some(name) = name.as_str() else {
            tracing::warn!(entry = %name, "ignoring non-string manifest entry");
            continue;
        };
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            tracing::warn!(name, "ignoring manifest entry that escapes the staging directory");
            continue;
        }
        let path = staging_dir.join(name);
        match fs::try_exists(&path).await {
            Ok(true) => found.push(path),
            _ => tracing::warn!(name, "manifest names a file missing from staging"),
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Relocation
// ---------------------------------------------------------------------------

/// How a relocation succeeded.
#[derive(Debug, PartialEq, Eq)]
pub enum RelocateOutcome {
    /// File moved into the load directory.
    Moved(PathBuf),
    /// A byte-identical copy already sits at the destination; nothing was
    /// written and the staging file was left in place.
    AlreadyPresent(PathBuf),
}

/// Move `src` into `load_dir`.
///
/// A same-named destination is compared by size then SHA-256: identical
/// content is a successful no-op (never overwritten, never duplicated);
/// differing content diverts the move to a timestamp-suffixed name so the
/// existing file stays untouched. Transient failures retry per `policy`;
/// terminal failures abort immediately with their specific reason.
pub async fn relocate(
    src: &Path,
    load_dir: &Path,
    policy: &MovePolicy,
) -> Result<RelocateOutcome, RelocateError> {
    fs::create_dir_all(load_dir).await.map_err(RelocateError::Io)?;

    let name = src.file_name().ok_or_else(|| {
        RelocateError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source has no file name",
        ))
    })?;
    let mut dst = load_dir.join(name);

    if fs::try_exists(&dst).await.map_err(RelocateError::Io)? {
        // A compare failure falls through to the rename path so the
        // existing destination is still never overwritten.
        if same_content(src, &dst).await.unwrap_or(false) {
            return Ok(RelocateOutcome::AlreadyPresent(dst));
        }
        dst = versioned_destination(load_dir, src);
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match move_file(src, &dst).await {
            Ok(()) => return Ok(RelocateOutcome::Moved(dst)),
            Err(e) => match classify(&e) {
                IoClass::Transient if attempt < policy.max_retries => {
                    tracing::debug!(
                        attempt,
                        file = %src.display(),
                        error = %e,
                        "transient move failure; retrying"
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                }
                IoClass::Transient => return Err(RelocateError::Locked),
                IoClass::PathTooLong => return Err(RelocateError::PathTooLong),
                IoClass::NoSpace => return Err(RelocateError::NoSpace),
                IoClass::Other => return Err(RelocateError::Io(e)),
            },
        }
    }
}

/// Size first, then SHA-256 content comparison.
async fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let (meta_a, meta_b) = (fs::metadata(a).await?, fs::metadata(b).await?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(hashing::sha256_file(a).await? == hashing::sha256_file(b).await?)
}

/// Collision-avoiding destination: `{stem}_{unix_ts}{.ext}`.
fn versioned_destination(load_dir: &Path, src: &Path) -> PathBuf {
    let ts = chrono::Utc::now().timestamp();
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match src.extension() {
        Some(ext) => load_dir.join(format!("{stem}_{ts}.{}", ext.to_string_lossy())),
        None => load_dir.join(format!("{stem}_{ts}")),
    }
}

/// Rename, falling back to copy+remove when the load directory lives on
/// another filesystem.
async fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            fs::copy(src, dst).await?;
            fs::remove_file(src).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
const CROSS_DEVICE: i32 = 18; // EXDEV
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17; // ERROR_NOT_SAME_DEVICE

fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE)
}

/// Failure classes driving the retry decision.
enum IoClass {
    Transient,
    PathTooLong,
    NoSpace,
    Other,
}

/// Classify a move failure: sharing violations and permission errors are
/// retried, full-volume and over-long-path errors are terminal, anything
/// else surfaces immediately with its code.
fn classify(e: &io::Error) -> IoClass {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return IoClass::Transient;
    }
    match e.raw_os_error() {
        #[cfg(windows)]
        Some(32) | Some(33) => IoClass::Transient, // sharing / lock violation
        #[cfg(windows)]
        Some(206) => IoClass::PathTooLong,
        #[cfg(windows)]
        Some(112) => IoClass::NoSpace,
        #[cfg(unix)]
        Some(36) => IoClass::PathTooLong, // ENAMETOOLONG
        #[cfg(unix)]
        Some(28) => IoClass::NoSpace, // ENOSPC
        _ => IoClass::Other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
