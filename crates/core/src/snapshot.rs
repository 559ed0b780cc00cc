//! Atomic registry snapshot for external visibility.
//!
//! Each run fully replaces a semicolon-delimited, BOM-prefixed projection
//! of the pending tasks (plus the derived handler path) in the registry
//! directory. The file is written to a `.tmp` sibling and renamed into
//! place so readers never observe a partial table. With nothing pending,
//! a single NO_TASKS sentinel row replaces the table.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::CoreError;
use crate::registry::PendingTask;

/// Snapshot file name inside the registry directory.
pub const SNAPSHOT_FILE: &str = "new_files_registry.csv";
/// Temp sibling used for the atomic replace.
const TMP_FILE: &str = "new_files_registry.csv.tmp";

/// Status value of the sentinel row written when nothing is pending.
pub const STATUS_NO_TASKS: &str = "NO_TASKS";

/// Handler column value for tasks with no registered handler.
pub const NO_HANDLER: &str = "NO_SCRIPT_FOUND";

/// Snapshot header: the task fields plus the derived handler column.
pub const COLUMNS: &[&str] = &[
    "id",
    "file_path",
    "status",
    "data_provider",
    "report_year",
    "report_month",
    "client_name",
    "report_type",
    "uploaded_at",
    "created_at",
    "handler",
];

const DELIMITER: char = ';';
const BOM: &str = "\u{feff}";
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write the snapshot for the fetched rows; returns the snapshot path.
pub async fn write(registry_dir: &Path, pending: &[PendingTask]) -> Result<PathBuf, CoreError> {
    let mut lines = Vec::with_capacity(pending.len());
    for entry in pending {
        let task = &entry.task;
        let handler = entry
            .handler
            .as_ref()
            .map(|spec| spec.path.display().to_string())
            .unwrap_or_else(|| NO_HANDLER.to_string());

        lines.push(render_row(&[
            task.id.to_string(),
            task.file_path.clone(),
            task.status.as_str().to_string(),
            task.data_provider.clone(),
            task.report_year.map(|y| y.to_string()).unwrap_or_default(),
            task.report_month.map(|m| m.to_string()).unwrap_or_default(),
            task.client_name.clone(),
            task.report_type.clone().unwrap_or_default(),
            task.uploaded_at.format(TS_FORMAT).to_string(),
            task.created_at.format(TS_FORMAT).to_string(),
            handler,
        ]));
    }
    replace_snapshot(registry_dir, &lines).await
}

/// Write the single NO_TASKS sentinel row; returns the snapshot path.
pub async fn write_empty(registry_dir: &Path) -> Result<PathBuf, CoreError> {
    let now = chrono::Utc::now().format(TS_FORMAT).to_string();
    let sentinel = render_row(&[
        String::new(),
        String::new(),
        STATUS_NO_TASKS.to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        now,
        String::new(),
        String::new(),
    ]);
    replace_snapshot(registry_dir, &[sentinel]).await
}

/// Assemble the full table and atomically replace the snapshot file.
async fn replace_snapshot(registry_dir: &Path, rows: &[String]) -> Result<PathBuf, CoreError> {
    fs::create_dir_all(registry_dir).await?;

    let mut content = String::from(BOM);
    content.push_str(&COLUMNS.join(&DELIMITER.to_string()));
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }

    let out_path = registry_dir.join(SNAPSHOT_FILE);
    let tmp_path = registry_dir.join(TMP_FILE);
    fs::write(&tmp_path, content).await?;
    fs::rename(&tmp_path, &out_path).await?;
    Ok(out_path)
}

/// Join cells with the delimiter, quoting any cell that needs it.
fn render_row(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| quote(cell))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// Double-quote a cell containing the delimiter, quotes, or newlines,
/// doubling embedded quotes.
fn quote(cell: &str) -> String {
    if cell.contains(DELIMITER) || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
    {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::handlers::{HandlerKind, HandlerSpec};
    use crate::task::{Task, TaskStatus};

    fn pending(id: i64, with_handler: bool) -> PendingTask {
        let now = chrono::Utc::now();
        PendingTask {
            task: Task {
                id,
                file_path: format!("/intake/raw_{id}.xlsx"),
                status: TaskStatus::New,
                data_provider: "Distributor".into(),
                report_year: Some(2026),
                report_month: Some(7),
                client_name: "Client_01".into(),
                report_type: Some("Type1".into()),
                uploaded_at: now,
                created_at: now,
                error_reason: None,
            },
            handler: with_handler.then(|| HandlerSpec {
                kind: HandlerKind::Python,
                path: PathBuf::from("/opt/handlers/Client_01.py"),
            }),
        }
    }

    #[tokio::test]
    async fn write_produces_bom_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), &[pending(1, true), pending(2, false)])
            .await
            .expect("write");

        let content = std::fs::read_to_string(&path).expect("read snapshot");
        assert!(content.starts_with('\u{feff}'));

        let lines: Vec<&str> = content.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(";"));
        assert!(lines[1].starts_with("1;/intake/raw_1.xlsx;NEW;Distributor;2026;7;"));
        assert!(lines[1].ends_with("/opt/handlers/Client_01.py"));
        assert!(lines[2].ends_with(NO_HANDLER));
    }

    #[tokio::test]
    async fn write_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), &[pending(1, true)]).await.expect("write");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![SNAPSHOT_FILE.to_string()]);
    }

    #[tokio::test]
    async fn write_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), &[pending(1, true), pending(2, true)])
            .await
            .expect("write");
        let path = write_empty(dir.path()).await.expect("write empty");

        let content = std::fs::read_to_string(&path).expect("read snapshot");
        assert_eq!(content.trim_start_matches('\u{feff}').lines().count(), 2);
    }

    #[tokio::test]
    async fn sentinel_row_carries_no_tasks_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_empty(dir.path()).await.expect("write empty");

        let content = std::fs::read_to_string(&path).expect("read snapshot");
        let row = content.lines().nth(1).expect("sentinel row");
        let cells: Vec<&str> = row.split(';').collect();
        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[2], STATUS_NO_TASKS);
        assert!(!cells[8].is_empty(), "sentinel should carry a timestamp");
    }

    #[tokio::test]
    async fn cells_containing_the_delimiter_are_quoted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut entry = pending(3, false);
        entry.task.file_path = "/intake/oddly;named.xlsx".into();

        let path = write(dir.path(), &[entry]).await.expect("write");
        let content = std::fs::read_to_string(&path).expect("read snapshot");
        assert!(content.contains("\"/intake/oddly;named.xlsx\""));
    }
}
