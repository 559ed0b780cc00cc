//! Repository for the `file_registry` table.
//!
//! The orchestrator holds the run lock for the whole run, so every write
//! here is a single-row, immediately committed statement -- there is no
//! competing writer to coordinate with.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use loadbay_core::registry::TaskRegistry;
use loadbay_core::task::{FailureReason, Task, TaskStatus};
use loadbay_core::types::DbId;

use crate::error::DbError;

/// Column list for `file_registry` SELECT queries.
const COLUMNS: &str = "\
    id, file_path, status, data_provider, \
    report_year, report_month, client_name, report_type, \
    uploaded_at, created_at, error_reason";

/// Provides query operations for file-registry rows.
#[derive(Clone)]
pub struct FileRegistryRepo {
    pool: PgPool,
}

impl FileRegistryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Map one row into a [`Task`], rejecting out-of-set status strings.
    fn row_to_task(row: &PgRow) -> Result<Task, DbError> {
        let status_str: String = row.try_get("status")?;
        let status = TaskStatus::from_str(&status_str)?;

        Ok(Task {
            id: row.try_get("id")?,
            file_path: row.try_get("file_path")?,
            status,
            data_provider: row.try_get("data_provider")?,
            report_year: row.try_get("report_year")?,
            report_month: row.try_get("report_month")?,
            client_name: row.try_get("client_name")?,
            report_type: row.try_get("report_type")?,
            uploaded_at: row.try_get("uploaded_at")?,
            created_at: row.try_get("created_at")?,
            error_reason: row.try_get("error_reason")?,
        })
    }
}

impl TaskRegistry for FileRegistryRepo {
    type Error = DbError;

    /// Rows awaiting processing, oldest intake first so long-queued items
    /// are not starved by newer arrivals.
    async fn fetch_pending(&self) -> Result<Vec<Task>, DbError> {
        let query = format!(
            "SELECT {COLUMNS} FROM file_registry \
             WHERE status IN ('NEW', 'PROCESSING', 'ERROR') \
             ORDER BY uploaded_at"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn update_status(
        &self,
        id: DbId,
        status: TaskStatus,
        reason: Option<&FailureReason>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE file_registry SET status = $2, error_reason = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason.map(FailureReason::code))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(task_id = id, status = %status, "status update matched no row");
        }
        Ok(())
    }
}
