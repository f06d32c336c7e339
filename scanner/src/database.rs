//! SQLite-backed repository implementation (component C13's storage side).
//!
//! Mirrors the teacher's `AgentDatabase`: a lazily-opened connection guarded
//! by WAL mode and a busy timeout, with per-entity operations delegated to
//! `database/db_*.rs` submodules. Unlike the teacher, the connection is
//! shared across the async engine behind a `tokio::sync::Mutex` so every
//! repository trait method can be called concurrently from different tasks
//! (the executor, the scheduler, the worker pool) without races.

mod db_domains;
mod db_results;
mod db_settings;
mod db_tasks;
mod db_templates;
mod db_workers;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use shared::config::Settings;
use shared::domain::Domain;
use shared::repository::{
    DomainRepository, NewScanResult, NewTask, ResultRepository, SettingsRepository, TaskRepository, TemplateRepository,
    WorkerRepository,
};
use shared::task::{ScanTask, TaskStatus, TaskTarget};
use shared::template::PathTemplate;
use shared::worker::WorkerEndpoint;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Opens (creating if absent) the database at `db_path`, enables WAL
    /// mode, and sets the configured busy timeout.
    pub fn open<P: AsRef<Path>>(db_path: P, busy_timeout_secs: u64) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create database directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path).with_context(|| format!("failed to open database: {}", db_path.display()))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(())).context("failed to enable WAL mode")?;
        conn.busy_timeout(std::time::Duration::from_secs(busy_timeout_secs))
            .context("failed to set busy timeout")?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Creates every table used by the engine. Idempotent (`CREATE TABLE IF
    /// NOT EXISTS`), safe to call on every startup (`--init-db` and the
    /// normal boot path both call this).
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing database schema");
        let conn = self.conn.lock().await;
        db_domains::create_tables(&conn)?;
        db_tasks::create_tables(&conn)?;
        db_results::create_tables(&conn)?;
        db_templates::create_tables(&conn)?;
        db_workers::create_tables(&conn)?;
        db_settings::create_tables(&conn)?;
        Ok(())
    }
}

#[async_trait]
impl DomainRepository for SqliteRepository {
    async fn count_unscanned(&self) -> Result<i64> {
        db_domains::count_unscanned(&*self.conn.lock().await)
    }

    async fn count_all(&self) -> Result<i64> {
        db_domains::count_all(&*self.conn.lock().await)
    }

    async fn page(&self, target: TaskTarget, offset: i64, limit: i64) -> Result<Vec<Domain>> {
        db_domains::page(&*self.conn.lock().await, target, offset, limit)
    }

    async fn mark_scanned(&self, ids: &[i64]) -> Result<()> {
        db_domains::mark_scanned(&*self.conn.lock().await, ids)
    }

    async fn reset_all_scan_status(&self) -> Result<()> {
        db_domains::reset_all_scan_status(&*self.conn.lock().await)
    }
}

#[async_trait]
impl TaskRepository for SqliteRepository {
    async fn create(&self, task: NewTask) -> Result<i64> {
        db_tasks::create(&*self.conn.lock().await, task, Utc::now())
    }

    async fn get(&self, id: i64) -> Result<Option<ScanTask>> {
        db_tasks::get(&*self.conn.lock().await, id)
    }

    async fn update(&self, task: &ScanTask) -> Result<()> {
        db_tasks::update(&*self.conn.lock().await, task)
    }

    async fn find_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<ScanTask>> {
        db_tasks::find_by_status(&*self.conn.lock().await, statuses)
    }

    async fn reset_running_to_pending(&self) -> Result<u64> {
        db_tasks::reset_running_to_pending(&*self.conn.lock().await)
    }

    async fn count_pending_or_running(&self) -> Result<i64> {
        db_tasks::count_pending_or_running(&*self.conn.lock().await)
    }
}

#[async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_batch(&self, results: &[NewScanResult]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        db_results::append_batch(&mut conn, results)
    }
}

#[async_trait]
impl TemplateRepository for SqliteRepository {
    async fn enabled(&self) -> Result<Vec<PathTemplate>> {
        db_templates::enabled(&*self.conn.lock().await)
    }
}

#[async_trait]
impl WorkerRepository for SqliteRepository {
    async fn load_all(&self) -> Result<Vec<WorkerEndpoint>> {
        db_workers::load_all(&*self.conn.lock().await)
    }

    async fn upsert(&self, worker: &WorkerEndpoint) -> Result<()> {
        db_workers::upsert(&*self.conn.lock().await, worker, Utc::now())
    }
}

#[async_trait]
impl SettingsRepository for SqliteRepository {
    async fn load(&self) -> Result<Settings> {
        db_settings::load(&*self.conn.lock().await)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        db_settings::set(&*self.conn.lock().await, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::repository::NewScanResult;

    async fn temp_repo() -> (SqliteRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(dir.path().join("test.db"), 5).unwrap();
        repo.initialize().await.unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn schema_initialization_is_idempotent() {
        let (repo, _dir) = temp_repo().await;
        repo.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn task_lifecycle_round_trips() {
        let (repo, _dir) = temp_repo().await;
        let id = repo
            .create(NewTask {
                name: "test".into(),
                target: TaskTarget::Incremental,
                url_template: "(domain)/x".into(),
                concurrency: 10,
            })
            .await
            .unwrap();

        let task = repo.get(id).await.unwrap().expect("task exists");
        assert_eq!(task.status, TaskStatus::Pending);

        let mut updated = task.clone();
        updated.status = TaskStatus::Running;
        repo.update(&updated).await.unwrap();

        let reloaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn result_batch_append_persists_rows() {
        let (repo, _dir) = temp_repo().await;
        let id = repo
            .create(NewTask {
                name: "t".into(),
                target: TaskTarget::Full,
                url_template: "(domain)/x".into(),
                concurrency: 10,
            })
            .await
            .unwrap();

        repo.append_batch(&[NewScanResult {
            task_id: id,
            domain: "example.com".into(),
            url: "https://example.com/x".into(),
            status: 200,
            content_type: Some("text/html".into()),
            size: 10,
            scanned_at: Utc::now(),
        }])
        .await
        .unwrap();
    }
}
