//! Seam between the coordinator and the durable task store.
//!
//! The production implementation lives in `loadbay-db` (PostgreSQL); tests
//! substitute an in-memory registry. Mirrors the single-writer model: only
//! one process holds the run lock, so every write here commits immediately.

use std::future::Future;

use crate::handlers::HandlerSpec;
use crate::task::{FailureReason, Task, TaskStatus};
use crate::types::DbId;

/// Read/write access to the file registry.
pub trait TaskRegistry: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch rows pending processing (NEW, PROCESSING, or ERROR), ordered
    /// ascending by intake timestamp so long-queued items are not starved.
    fn fetch_pending(&self) -> impl Future<Output = Result<Vec<Task>, Self::Error>> + Send;

    /// Persist a status transition for a single task.
    ///
    /// `reason` is written to `error_reason`; `None` clears it. The closed
    /// [`TaskStatus`] / [`FailureReason`] types keep out-of-set values from
    /// ever reaching the store.
    fn update_status(
        &self,
        id: DbId,
        status: TaskStatus,
        reason: Option<&FailureReason>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A fetched task with its handler reference derived at fetch time.
///
/// `handler` is `None` when no handler is registered for the task's
/// (provider, client) pair; the dispatcher parks such tasks instead of
/// launching anything.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub task: Task,
    pub handler: Option<HandlerSpec>,
}
