//! Scan result table operations (`scan_results`, §6 persistence schema).

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use shared::repository::NewScanResult;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS scan_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            domain TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            content_type TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            scanned_at TEXT NOT NULL
        )
        "#,
        [],
    )
    .context("failed to create scan_results table")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_scan_results_task ON scan_results(task_id)", [])
        .context("failed to create scan_results task index")?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_scan_results_status ON scan_results(status)", [])
        .context("failed to create scan_results status index")?;

    Ok(())
}

/// Appends every result in one transaction (§5 "batched into a single
/// transaction per progress callback").
pub(super) fn append_batch(conn: &mut Connection, results: &[NewScanResult]) -> Result<()> {
    if results.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction().context("failed to start scan_results transaction")?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO scan_results (task_id, domain, url, status, content_type, size, scanned_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .context("failed to prepare scan_results insert")?;
        for result in results {
            stmt.execute(params![
                result.task_id,
                result.domain,
                result.url,
                result.status,
                result.content_type,
                result.size,
                result.scanned_at.to_rfc3339(),
            ])
            .context("failed to insert scan result")?;
        }
    }
    tx.commit().context("failed to commit scan_results transaction")?;
    Ok(())
}
