//! Advisory-lock run guard backed by PostgreSQL.
//!
//! `pg_try_advisory_lock` is session-scoped: the lock rides on one
//! dedicated pool connection held for the entire run, and a crashed
//! process releases it implicitly when its session dies. Cooperative
//! only -- it guards against other orchestrator instances, not against
//! arbitrary writers.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use loadbay_core::lock::RunLock;

/// Run guard holding (or waiting to hold) the advisory lock for `key`.
pub struct PgRunLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

impl PgRunLock {
    /// Check out the dedicated lock connection.
    ///
    /// The lock itself is not taken until [`RunLock::try_acquire`].
    pub async fn connect(pool: &PgPool, key: i64) -> Result<Self, sqlx::Error> {
        Ok(Self {
            conn: pool.acquire().await?,
            key,
        })
    }
}

impl RunLock for PgRunLock {
    type Error = sqlx::Error;

    async fn try_acquire(&mut self) -> Result<bool, sqlx::Error> {
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.key)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(locked)
    }

    async fn release(&mut self) -> Result<(), sqlx::Error> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .fetch_one(&mut *self.conn)
            .await?;
        if !released {
            tracing::warn!(key = self.key, "advisory lock was not held at release");
        }
        Ok(())
    }
}
