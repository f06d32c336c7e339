//! Domain table operations (`domains`, §6 persistence schema).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use shared::domain::Domain;
use shared::task::TaskTarget;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS domains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL UNIQUE,
            rank INTEGER NOT NULL,
            first_seen_at TEXT NOT NULL,
            last_seen_in_csv_at TEXT NOT NULL,
            has_been_scanned INTEGER NOT NULL DEFAULT 0
        )
        "#,
        [],
    )
    .context("failed to create domains table")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_domains_rank ON domains(rank)", [])
        .context("failed to create domains rank index")?;

    Ok(())
}

fn row_to_domain(row: &rusqlite::Row<'_>) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: row.get(0)?,
        name: row.get(1)?,
        rank: row.get(2)?,
        first_seen_at: row.get::<_, String>(3)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        last_seen_in_csv_at: row.get::<_, String>(4)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        has_been_scanned: row.get::<_, i64>(5)? != 0,
    })
}

pub(super) fn count_unscanned(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM domains WHERE has_been_scanned = 0", [], |r| r.get(0))
        .context("failed to count unscanned domains")
}

pub(super) fn count_all(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM domains", [], |r| r.get(0))
        .context("failed to count domains")
}

pub(super) fn page(conn: &Connection, target: TaskTarget, offset: i64, limit: i64) -> Result<Vec<Domain>> {
    let sql = match target {
        TaskTarget::Incremental => {
            "SELECT id, domain, rank, first_seen_at, last_seen_in_csv_at, has_been_scanned \
             FROM domains WHERE has_been_scanned = 0 ORDER BY rank ASC LIMIT ?1 OFFSET ?2"
        }
        TaskTarget::Full => {
            "SELECT id, domain, rank, first_seen_at, last_seen_in_csv_at, has_been_scanned \
             FROM domains ORDER BY rank ASC LIMIT ?1 OFFSET ?2"
        }
    };
    let mut stmt = conn.prepare(sql).context("failed to prepare domain page query")?;
    let rows = stmt
        .query_map(params![limit, offset], row_to_domain)
        .context("failed to query domain page")?;
    rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read domain page rows")
}

pub(super) fn mark_scanned(conn: &Connection, ids: &[i64]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("UPDATE domains SET has_been_scanned = 1 WHERE id IN ({placeholders})");
    let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    conn.execute(&sql, params.as_slice()).context("failed to mark domains scanned")?;
    Ok(())
}

pub(super) fn reset_all_scan_status(conn: &Connection) -> Result<()> {
    conn.execute("UPDATE domains SET has_been_scanned = 0", [])
        .context("failed to reset scan status")?;
    Ok(())
}
