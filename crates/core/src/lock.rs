//! Run-wide mutual exclusion seam.
//!
//! One orchestrator instance holds the lock for the entire run; a second
//! instance that fails `try_acquire` must exit without any side effects.
//! The production implementation is a PostgreSQL advisory lock in
//! `loadbay-db`; any backend works as long as try-acquire is non-blocking
//! and the lock is held for the duration of the run.

use std::future::Future;

/// Advisory mutual exclusion over the registry and the shared directories.
pub trait RunLock: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Attempt to take the lock without blocking.
    ///
    /// `false` means another instance owns it; the caller must abort the
    /// run before touching any task.
    fn try_acquire(&mut self) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Release the lock. Called on every exit path once acquired.
    fn release(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
