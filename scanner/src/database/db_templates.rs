//! Path template table operations (`path_templates`, §6 persistence schema).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use shared::template::PathTemplate;

pub(super) fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS path_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            template TEXT NOT NULL,
            description TEXT,
            expected_content_type TEXT,
            exclude_content_type INTEGER NOT NULL DEFAULT 0,
            min_size INTEGER NOT NULL DEFAULT 0,
            max_size INTEGER,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        [],
    )
    .context("failed to create path_templates table")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_path_templates_enabled ON path_templates(enabled)", [])
        .context("failed to create path_templates enabled index")?;

    Ok(())
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<PathTemplate> {
    Ok(PathTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        template: row.get(2)?,
        description: row.get(3)?,
        expected_content_type: row.get(4)?,
        exclude_content_type: row.get::<_, i64>(5)? != 0,
        min_size: row.get(6)?,
        max_size: row.get(7)?,
        enabled: row.get::<_, i64>(8)? != 0,
        created_at: row.get::<_, String>(9)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>(10)?.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str =
    "id, name, template, description, expected_content_type, exclude_content_type, min_size, max_size, enabled, created_at, updated_at";

pub(super) fn enabled(conn: &Connection) -> Result<Vec<PathTemplate>> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM path_templates WHERE enabled = 1");
    let mut stmt = conn.prepare(&sql).context("failed to prepare enabled templates query")?;
    let rows = stmt.query_map([], row_to_template).context("failed to query enabled templates")?;
    rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read template rows")
}
