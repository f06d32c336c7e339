//! Settings table operations (`settings`, §6 persistence schema).

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use shared::config::Settings;
use std::collections::HashMap;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )
    .context("failed to create settings table")?;
    Ok(())
}

pub(super) fn load(conn: &Connection) -> Result<Settings> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings").context("failed to prepare settings query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .context("failed to query settings")?;
    let map: HashMap<String, String> = rows.collect::<rusqlite::Result<_>>().context("failed to read settings rows")?;
    Ok(Settings::from_map(map))
}

pub(super) fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .context("failed to write setting")?;
    Ok(())
}
