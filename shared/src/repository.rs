//! Repository traits (component C13, Design Notes §9 "pass a repository
//! interface explicitly").
//!
//! The engine never imports a database module directly; every storage
//! access goes through one of these traits, so `scanner`'s control-flow
//! logic (worker pool bookkeeping, the executor's pagination, the
//! scheduler's single-flight guard) can be unit tested against an
//! in-memory implementation instead of SQLite.

use crate::domain::Domain;
use crate::task::{ScanResult, ScanTask, TaskStatus, TaskTarget};
use crate::template::PathTemplate;
use crate::worker::WorkerEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fields the caller supplies when creating a task; storage assigns `id`,
/// `created_at`, `status = pending`, and zeroes the counters.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub target: TaskTarget,
    pub url_template: String,
    pub concurrency: u32,
}

/// A single probe outcome ready to append to `scan_results`; storage
/// assigns `id`.
#[derive(Debug, Clone)]
pub struct NewScanResult {
    pub task_id: i64,
    pub domain: String,
    pub url: String,
    pub status: i32,
    pub content_type: Option<String>,
    pub size: i64,
    pub scanned_at: DateTime<Utc>,
}

#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn count_unscanned(&self) -> anyhow::Result<i64>;
    async fn count_all(&self) -> anyhow::Result<i64>;

    /// A page of domains ordered by `rank` ascending, offset-paginated.
    /// `target = Incremental` restricts to `has_been_scanned = false`.
    async fn page(&self, target: TaskTarget, offset: i64, limit: i64) -> anyhow::Result<Vec<Domain>>;

    /// Marks every listed domain id as scanned, in one transaction.
    async fn mark_scanned(&self, ids: &[i64]) -> anyhow::Result<()>;

    /// Flips `has_been_scanned` to false for every domain (full-rescan reset).
    async fn reset_all_scan_status(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: NewTask) -> anyhow::Result<i64>;
    async fn get(&self, id: i64) -> anyhow::Result<Option<ScanTask>>;
    async fn update(&self, task: &ScanTask) -> anyhow::Result<()>;
    async fn find_by_status(&self, statuses: &[TaskStatus]) -> anyhow::Result<Vec<ScanTask>>;

    /// Resets every `running` task to `pending`; returns how many were reset.
    async fn reset_running_to_pending(&self) -> anyhow::Result<u64>;

    async fn count_pending_or_running(&self) -> anyhow::Result<i64>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Appends a batch of results in a single transaction (§4.8/§5).
    async fn append_batch(&self, results: &[NewScanResult]) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn enabled(&self) -> anyhow::Result<Vec<PathTemplate>>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn load_all(&self) -> anyhow::Result<Vec<WorkerEndpoint>>;
    async fn upsert(&self, worker: &WorkerEndpoint) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> anyhow::Result<crate::config::Settings>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}
