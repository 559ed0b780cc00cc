//! Per-kind handler launch and outcome classification.
//!
//! `RESOLVED → LAUNCHED → {SUCCEEDED, FAILED(reason)}` for one task:
//! the runner builds the command for the handler's runtime, executes it
//! through [`subprocess::run_command`], and folds the result into a
//! [`DispatchOutcome`] carrying the registry failure reason.

use std::os::unix::fs::PermissionsExt;

use tokio::process::Command;

use super::executor::{HandlerError, HandlerInput, HandlerOutput};
use super::subprocess;
use crate::handlers::{HandlerKind, HandlerSpec};
use crate::task::{FailureReason, Task};

// ---------------------------------------------------------------------------
// Environment contract
// ---------------------------------------------------------------------------

/// Task identity; required, always an integer.
pub const ENV_TASK_ID: &str = "TASK_ID";
/// Owning client; may be empty.
pub const ENV_TASK_CLIENT: &str = "TASK_CLIENT";
/// Source file path; may be empty.
pub const ENV_TASK_FILE: &str = "TASK_FILE";
/// Report kind; may be empty.
pub const ENV_TASK_REPORT_TYPE: &str = "TASK_REPORT_TYPE";

/// Build the environment variables passed to a handler for `task`.
///
/// This is the entire orchestrator→handler contract: no stdin payload,
/// no shared memory.
pub fn task_env(task: &Task) -> Vec<(String, String)> {
    vec![
        (ENV_TASK_ID.into(), task.id.to_string()),
        (ENV_TASK_CLIENT.into(), task.client_name.clone()),
        (ENV_TASK_FILE.into(), task.file_path.clone()),
        (
            ENV_TASK_REPORT_TYPE.into(),
            task.report_type.clone().unwrap_or_default(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// How one dispatch ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Exit code 0 -- proceed to output collection.
    Succeeded(HandlerOutput),
    /// The handler failed; `output` is present when the process ran to
    /// completion (non-zero exit), absent for timeouts and launch errors.
    Failed {
        reason: FailureReason,
        output: Option<HandlerOutput>,
    },
}

/// Launch `spec` with `input` and classify the result.
pub async fn run(spec: &HandlerSpec, input: HandlerInput) -> DispatchOutcome {
    match execute(spec, &input).await {
        Ok(output) if output.exit_code == 0 => DispatchOutcome::Succeeded(output),
        Ok(output) => DispatchOutcome::Failed {
            reason: FailureReason::ReturnCode(output.exit_code),
            output: Some(output),
        },
        Err(HandlerError::Timeout { .. }) => DispatchOutcome::Failed {
            reason: FailureReason::Timeout,
            output: None,
        },
        Err(e) => DispatchOutcome::Failed {
            reason: FailureReason::LaunchError(e.to_string()),
            output: None,
        },
    }
}

/// Build the runtime-appropriate command and run it to completion.
async fn execute(spec: &HandlerSpec, input: &HandlerInput) -> Result<HandlerOutput, HandlerError> {
    let mut cmd = match spec.kind {
        HandlerKind::Python => {
            let mut cmd = Command::new("python3");
            cmd.arg(&spec.path);
            cmd
        }
        HandlerKind::Shell => {
            let mut cmd = Command::new("bash");
            cmd.arg(&spec.path);
            cmd
        }
        HandlerKind::Binary => {
            let metadata = tokio::fs::metadata(&spec.path)
                .await
                .map_err(|_| HandlerError::NotFound(spec.path.display().to_string()))?;

            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                return Err(HandlerError::PermissionDenied(format!(
                    "{} (mode {mode:#o})",
                    spec.path.display()
                )));
            }
            Command::new(&spec.path)
        }
    };

    subprocess::run_command(&mut cmd, input).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
