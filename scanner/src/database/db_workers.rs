//! Worker endpoint table operations (`workers`, §6 persistence schema).
//!
//! Only `daily_usage`, `daily_quota`, and `quota_reset_at` are persisted
//! (§4.6); the rest of `WorkerEndpoint`'s runtime state (health, counters,
//! rate-limit) is process-local and rebuilt fresh on each startup.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use shared::error::DisabledReason;
use shared::worker::WorkerEndpoint;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            daily_usage INTEGER NOT NULL DEFAULT 0,
            daily_quota INTEGER NOT NULL,
            quota_reset_at TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            disabled_reason TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        [],
    )
    .context("failed to create workers table")?;

    Ok(())
}

fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkerEndpoint> {
    let disabled_reason: Option<String> = row.get(6)?;
    let enabled: i64 = row.get(5)?;
    Ok(WorkerEndpoint {
        id: row.get(0)?,
        url: row.get(1)?,
        healthy: enabled != 0,
        last_check: None,
        success_count: 0,
        error_count: 0,
        consecutive_failures: 0,
        rate_limited_until: None,
        daily_usage: row.get::<_, i64>(2)? as u64,
        daily_quota: row.get::<_, i64>(3)? as u64,
        quota_reset_at: row.get::<_, String>(4)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        permanently_disabled: enabled == 0,
        disabled_reason: disabled_reason.and_then(|tag| match tag.as_str() {
            "account_blocked" => Some(DisabledReason::AccountBlocked),
            "not_deployed" => Some(DisabledReason::NotDeployed),
            _ => None,
        }),
    })
}

pub(super) fn load_all(conn: &Connection) -> Result<Vec<WorkerEndpoint>> {
    let mut stmt = conn
        .prepare("SELECT id, url, daily_usage, daily_quota, quota_reset_at, enabled, disabled_reason, created_at FROM workers")
        .context("failed to prepare workers query")?;
    let rows = stmt.query_map([], row_to_worker).context("failed to query workers")?;
    rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read worker rows")
}

pub(super) fn upsert(conn: &Connection, worker: &WorkerEndpoint, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO workers (id, url, daily_usage, daily_quota, quota_reset_at, enabled, disabled_reason, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(id) DO UPDATE SET url = excluded.url, daily_usage = excluded.daily_usage, \
         daily_quota = excluded.daily_quota, quota_reset_at = excluded.quota_reset_at, \
         enabled = excluded.enabled, disabled_reason = excluded.disabled_reason",
        params![
            worker.id,
            worker.url,
            worker.daily_usage as i64,
            worker.daily_quota as i64,
            worker.quota_reset_at.to_rfc3339(),
            !worker.permanently_disabled as i64,
            worker.disabled_reason.map(|r| r.as_tag().to_string()),
            now.to_rfc3339(),
        ],
    )
    .context("failed to upsert worker")?;
    Ok(())
}
