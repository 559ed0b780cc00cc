//! Handler invocation types shared by the dispatch runner.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Input for one handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerInput {
    /// Environment variables set for the child process -- the only channel
    /// carrying task context into the handler.
    pub env_vars: Vec<(String, String)>,
    /// Working directory for the child process (current dir if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

/// Captured output from a handler run to completion.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerOutput {
    /// Captured stdout (capped; see `subprocess::MAX_OUTPUT_BYTES`).
    pub stdout: String,
    /// Captured stderr (capped likewise).
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Stdout parsed as JSON, or `None` if stdout is not valid JSON.
    /// Feeds the optional output manifest (`{"outputs": [...]}`).
    pub parsed_output: Option<Value>,
}

/// Errors that prevent a handler from running to completion.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler file was not found at the registered path.
    #[error("handler not found: {0}")]
    NotFound(String),
    /// The handler file exists but lacks execute permission.
    #[error("handler not executable: {0}")]
    PermissionDenied(String),
    /// The handler exceeded its configured timeout and was killed.
    #[error("handler timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },
    /// Spawning or waiting on the process failed.
    #[error("failed to launch handler: {0}")]
    Launch(#[from] std::io::Error),
}

/// Number of characters of each stream tail surfaced to operators.
pub const TAIL_CHARS: usize = 1000;

/// The last `max_chars` characters of `s`, respecting char boundaries.
///
/// Full streams are never persisted; this is the bounded view logged for
/// diagnostics.
pub fn tail(s: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
