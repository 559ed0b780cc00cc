//! Shared subprocess plumbing for handler dispatch.
//!
//! [`run_command`] spawns the prepared command, captures stdout/stderr,
//! and enforces the configured timeout. The runner builds a
//! [`tokio::process::Command`] appropriate for the handler kind and
//! delegates here.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::executor::{HandlerError, HandlerInput, HandlerOutput};

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output beyond this limit is dropped to keep a chatty handler from
/// exhausting memory; operators only ever see bounded tails anyway.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Spawn `cmd` as a child process, capture stdout/stderr, and enforce the
/// configured timeout.
///
/// The environment variables from [`HandlerInput`] are the only task
/// context passed to the child; stdin stays closed. `kill_on_drop(true)`
/// ensures a timed-out child is killed when dropped.
pub async fn run_command(
    cmd: &mut Command,
    input: &HandlerInput,
) -> Result<HandlerOutput, HandlerError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }

    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();

    let mut child = cmd.spawn()?;

    // Read stdout/stderr in spawned tasks so `child.wait()` (which borrows
    // `&mut child`) can run concurrently with the stream reads.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = tokio::time::timeout(input.timeout, child.wait()).await;

    match wait_result {
        Ok(Ok(status)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            let exit_code = status.code().unwrap_or(-1);
            let parsed_output = serde_json::from_str(stdout.trim()).ok();

            Ok(HandlerOutput {
                stdout,
                stderr,
                exit_code,
                duration_ms,
                parsed_output,
            })
        }
        Ok(Err(e)) => Err(HandlerError::Launch(e)),
        Err(_elapsed) => {
            // Timeout expired. `child` is dropped here, which kills the
            // process because we set `kill_on_drop(true)`.
            Err(HandlerError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at
/// [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
