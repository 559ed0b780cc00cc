//! Task rows, lifecycle statuses, and failure reasons.
//!
//! A [`Task`] mirrors one `file_registry` row. Statuses form a closed set
//! enforced at every boundary: unknown strings coming from the store are
//! rejected before any write, and [`TaskStatus`] makes an out-of-set write
//! unrepresentable.

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

/// Row created by the upstream intake process, not yet attempted.
pub const STATUS_NEW: &str = "NEW";
/// Dispatch in flight, or parked waiting for a handler to be registered.
pub const STATUS_PROCESSING: &str = "PROCESSING";
/// At least one output file landed in the load directory.
pub const STATUS_CREATED: &str = "CREATED";
/// The last dispatch cycle failed; `error_reason` carries the cause.
pub const STATUS_ERROR: &str = "ERROR";

/// All valid status values.
pub const VALID_STATUSES: &[&str] = &[STATUS_NEW, STATUS_PROCESSING, STATUS_CREATED, STATUS_ERROR];

// ---------------------------------------------------------------------------
// Status enum
// ---------------------------------------------------------------------------

/// Task lifecycle status with string conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    New,
    Processing,
    Created,
    Error,
}

impl TaskStatus {
    /// Return the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => STATUS_NEW,
            Self::Processing => STATUS_PROCESSING,
            Self::Created => STATUS_CREATED,
            Self::Error => STATUS_ERROR,
        }
    }

    /// Parse from a string, rejecting anything outside the closed set.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_NEW => Ok(Self::New),
            STATUS_PROCESSING => Ok(Self::Processing),
            STATUS_CREATED => Ok(Self::Created),
            STATUS_ERROR => Ok(Self::Error),
            other => Err(CoreError::Validation(format!(
                "Unknown task status: '{other}'. Valid statuses: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure reasons
// ---------------------------------------------------------------------------

/// Why a dispatch cycle failed, serialized into the `error_reason` column.
///
/// Variants with payloads render them into the code (`RETURN_CODE_3`,
/// `LAUNCH_ERROR:...`, `IO_ERROR:28`) so the registry stays greppable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No handler registered for the task's (provider, client) pair.
    NoScriptFound,
    /// The handler exceeded the configured wall-clock timeout.
    Timeout,
    /// The handler exited with a non-zero code.
    ReturnCode(i32),
    /// The handler process could not be started at all.
    LaunchError(String),
    /// The handler succeeded but left nothing in the staging directory.
    NoOutputFile,
    /// Relocation kept hitting transient errors through every retry.
    Locked,
    /// The destination path exceeds filesystem limits.
    PathTooLong,
    /// The destination volume is full.
    NoSpace,
    /// Any other relocation I/O failure, carrying the underlying code.
    Io(String),
}

impl FailureReason {
    /// Render the diagnostic code stored on the task row.
    pub fn code(&self) -> String {
        match self {
            Self::NoScriptFound => "NO_SCRIPT_FOUND".into(),
            Self::Timeout => "TIMEOUT".into(),
            Self::ReturnCode(n) => format!("RETURN_CODE_{n}"),
            Self::LaunchError(detail) => format!("LAUNCH_ERROR:{detail}"),
            Self::NoOutputFile => "NO_OUTPUT_FILE".into(),
            Self::Locked => "LOCKED".into(),
            Self::PathTooLong => "PATH_TOO_LONG".into(),
            Self::NoSpace => "NO_SPACE".into(),
            Self::Io(code) => format!("IO_ERROR:{code}"),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

// ---------------------------------------------------------------------------
// Task row
// ---------------------------------------------------------------------------

/// One pending row fetched from the file registry.
///
/// Descriptive fields are immutable; the orchestrator only ever writes
/// `status` and `error_reason` back.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: DbId,
    /// Source file the upstream intake registered.
    pub file_path: String,
    pub status: TaskStatus,
    pub data_provider: String,
    pub report_year: Option<i32>,
    pub report_month: Option<i32>,
    pub client_name: String,
    pub report_type: Option<String>,
    /// Intake timestamp; pending rows are processed oldest-first on it.
    pub uploaded_at: Timestamp,
    pub created_at: Timestamp,
    pub error_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::New,
            TaskStatus::Processing,
            TaskStatus::Created,
            TaskStatus::Error,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert!(TaskStatus::from_str("DONE").is_err());
        assert!(TaskStatus::from_str("new").is_err());
        assert!(TaskStatus::from_str("").is_err());
    }

    #[test]
    fn status_serializes_as_database_string() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
    }

    #[test]
    fn reason_codes_match_registry_vocabulary() {
        assert_eq!(FailureReason::NoScriptFound.code(), "NO_SCRIPT_FOUND");
        assert_eq!(FailureReason::Timeout.code(), "TIMEOUT");
        assert_eq!(FailureReason::ReturnCode(3).code(), "RETURN_CODE_3");
        assert_eq!(FailureReason::NoOutputFile.code(), "NO_OUTPUT_FILE");
        assert_eq!(FailureReason::Locked.code(), "LOCKED");
        assert_eq!(FailureReason::PathTooLong.code(), "PATH_TOO_LONG");
        assert_eq!(FailureReason::NoSpace.code(), "NO_SPACE");
    }

    #[test]
    fn reason_codes_carry_payloads() {
        assert_eq!(
            FailureReason::LaunchError("no such file".into()).code(),
            "LAUNCH_ERROR:no such file"
        );
        assert_eq!(FailureReason::Io("28".into()).code(), "IO_ERROR:28");
    }

    #[test]
    fn reason_display_matches_code() {
        assert_eq!(FailureReason::ReturnCode(127).to_string(), "RETURN_CODE_127");
    }
}
