//! Scan task table operations (`scan_tasks`, §6 persistence schema).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use shared::repository::NewTask;
use shared::task::{ScanTask, TaskStatus, TaskTarget};

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS scan_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            target TEXT NOT NULL,
            url_template TEXT NOT NULL,
            status TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            total_urls INTEGER NOT NULL DEFAULT 0,
            scanned_urls INTEGER NOT NULL DEFAULT 0,
            hits INTEGER NOT NULL DEFAULT 0,
            concurrency INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
        [],
    )
    .context("failed to create scan_tasks table")?;

    Ok(())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanTask> {
    let target: String = row.get(2)?;
    let status: String = row.get(4)?;
    Ok(ScanTask {
        id: row.get(0)?,
        name: row.get(1)?,
        target: target.parse().unwrap_or(TaskTarget::Incremental),
        url_template: row.get(3)?,
        status: status.parse().unwrap_or(TaskStatus::Pending),
        progress: row.get::<_, i64>(5)? as u32,
        total_urls: row.get(6)?,
        scanned_urls: row.get(7)?,
        hits: row.get(8)?,
        concurrency: row.get::<_, i64>(9)? as u32,
        created_at: row.get::<_, String>(10)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        started_at: row.get::<_, Option<String>>(11)?.and_then(|s| s.parse().ok()),
        completed_at: row.get::<_, Option<String>>(12)?.and_then(|s| s.parse().ok()),
    })
}

const SELECT_COLUMNS: &str =
    "id, name, target, url_template, status, progress, total_urls, scanned_urls, hits, concurrency, created_at, started_at, completed_at";

pub(super) fn create(conn: &Connection, task: NewTask, now: DateTime<Utc>) -> Result<i64> {
    conn.execute(
        "INSERT INTO scan_tasks (name, target, url_template, status, progress, total_urls, scanned_urls, hits, concurrency, created_at) \
         VALUES (?1, ?2, ?3, 'pending', 0, 0, 0, 0, ?4, ?5)",
        params![task.name, task.target.as_str(), task.url_template, task.concurrency, now.to_rfc3339()],
    )
    .context("failed to insert scan task")?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn get(conn: &Connection, id: i64) -> Result<Option<ScanTask>> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM scan_tasks WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_task)
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other).context("failed to query scan task"),
        })
}

pub(super) fn update(conn: &Connection, task: &ScanTask) -> Result<()> {
    conn.execute(
        "UPDATE scan_tasks SET name = ?1, target = ?2, url_template = ?3, status = ?4, progress = ?5, \
         total_urls = ?6, scanned_urls = ?7, hits = ?8, concurrency = ?9, started_at = ?10, completed_at = ?11 \
         WHERE id = ?12",
        params![
            task.name,
            task.target.as_str(),
            task.url_template,
            task.status.as_str(),
            task.progress,
            task.total_urls,
            task.scanned_urls,
            task.hits,
            task.concurrency,
            task.started_at.map(|t| t.to_rfc3339()),
            task.completed_at.map(|t| t.to_rfc3339()),
            task.id,
        ],
    )
    .context("failed to update scan task")?;
    Ok(())
}

pub(super) fn find_by_status(conn: &Connection, statuses: &[TaskStatus]) -> Result<Vec<ScanTask>> {
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT {SELECT_COLUMNS} FROM scan_tasks WHERE status IN ({placeholders})");
    let tags: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    let params: Vec<&dyn rusqlite::ToSql> = tags.iter().map(|t| t as &dyn rusqlite::ToSql).collect();
    let mut stmt = conn.prepare(&sql).context("failed to prepare task status query")?;
    let rows = stmt.query_map(params.as_slice(), row_to_task).context("failed to query tasks by status")?;
    rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read task rows")
}

pub(super) fn reset_running_to_pending(conn: &Connection) -> Result<u64> {
    let changed = conn
        .execute("UPDATE scan_tasks SET status = 'pending' WHERE status = 'running'", [])
        .context("failed to reset running tasks")?;
    Ok(changed as u64)
}

pub(super) fn count_pending_or_running(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM scan_tasks WHERE status IN ('pending', 'running')",
        [],
        |r| r.get(0),
    )
    .context("failed to count pending/running tasks")
}
