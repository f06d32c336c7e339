//! `ScanTask` and `ScanResult` entities (§3 Data Model)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an incremental vs. full-rescan task targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTarget {
    /// Only domains with `has_been_scanned = false`.
    Incremental,
    /// Every domain, after resetting `has_been_scanned` to false for all.
    Full,
}

impl TaskTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTarget::Incremental => "incremental",
            TaskTarget::Full => "full",
        }
    }
}

impl std::str::FromStr for TaskTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(TaskTarget::Incremental),
            "full" => Ok(TaskTarget::Full),
            other => Err(format!("unknown task target: {other}")),
        }
    }
}

/// The task state machine of §3: `pending -> running -> (completed|failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A scan task: one end-to-end run of (domains x templates) probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: i64,
    pub name: String,
    pub target: TaskTarget,
    /// Comma-joined list of template source strings.
    pub url_template: String,
    pub status: TaskStatus,
    pub progress: u32,
    pub total_urls: i64,
    pub scanned_urls: i64,
    pub hits: i64,
    /// Local-strategy concurrency bound, 1..=1000.
    pub concurrency: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanTask {
    /// The individual template source strings parsed out of `url_template`.
    pub fn templates(&self) -> Vec<String> {
        self.url_template
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// §4.8 step 11: `round(100 * scanned_urls / (total_domains * num_templates))`.
    pub fn compute_progress(total_domains: i64, num_templates: i64, scanned_urls: i64) -> u32 {
        let denom = total_domains.saturating_mul(num_templates);
        if denom <= 0 {
            return 100;
        }
        let pct = (scanned_urls as f64 * 100.0 / denom as f64).round();
        pct.clamp(0.0, 100.0) as u32
    }
}

/// An append-only scan result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: i64,
    pub task_id: i64,
    pub domain: String,
    pub url: String,
    /// HTTP status, or `-1` for timeout/network error.
    pub status: i32,
    pub content_type: Option<String>,
    /// Bytes; `0` denotes "unknown" (the measured size was null).
    pub size: i64,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn is_hit(&self) -> bool {
        self.status == 200
    }
}
