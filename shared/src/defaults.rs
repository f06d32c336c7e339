//! Default values for dynamic settings and bootstrap configuration.
//!
//! Centralized the way the teacher centralizes `serde`'s `#[serde(default =
//! "...")]` targets in its own `defaults.rs`; here they double as the
//! fallback values `shared::config::Settings` uses when a key is absent
//! from the `settings` table (§6 "Defaults").

/// `max_concurrency` — upper bound offered to the local concurrency controller.
pub fn default_max_concurrency() -> u32 {
    100
}

/// `request_timeout` (seconds) — per-probe HEAD timeout.
pub fn default_request_timeout_secs() -> u64 {
    10
}

/// `retry_count` — client-side retry budget given to the worker client per sub-batch.
pub fn default_retry_count() -> u32 {
    2
}

/// `worker_batch_size` — URLs per worker sub-batch, capped at 10 per §4.7/P3.
pub fn default_worker_batch_size() -> u32 {
    10
}

/// `worker_timeout` (milliseconds) — overall timeout for one worker batch call.
pub fn default_worker_timeout_ms() -> u64 {
    10_000
}

/// `worker_daily_quota` — default per-endpoint daily request budget.
pub fn default_worker_daily_quota() -> u64 {
    100_000
}

/// `automation_incremental_enabled`
pub fn default_automation_incremental_enabled() -> bool {
    true
}

/// `automation_rescan_enabled`
pub fn default_automation_rescan_enabled() -> bool {
    false
}

/// `scan_concurrency` — default local-strategy concurrency for new tasks.
pub fn default_scan_concurrency() -> u32 {
    50
}

/// `default_url_template` used when automation creates a task and no
/// enabled templates exist.
pub fn default_url_template() -> String {
    "https://{domain}".to_string()
}

/// Worker pool health defaults (§4.6).
pub fn default_health_check_interval_secs() -> u64 {
    60
}

pub fn default_unhealthy_threshold_pct() -> f64 {
    90.0
}

pub fn default_cooldown_period_secs() -> u64 {
    300
}

pub fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

/// §4.8 `DOMAIN_BATCH_SIZE`.
pub fn default_domain_batch_size() -> i64 {
    1000
}

/// §2 "local-strategy fixed probe timeout" used when the worker strategy is
/// unavailable and the scheduler falls back to local scanning without a
/// task-level concurrency override.
pub fn default_local_probe_timeout_secs() -> u64 {
    10
}

/// §4.7 `maxRetries` for a worker sub-batch.
pub fn default_worker_max_retries() -> u32 {
    3
}

/// The well-known user agent sent on every probe (§4.3).
pub fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; DomainScanEngine/1.0)".to_string()
}

/// Database busy timeout, matching the teacher's `default_database_busy_timeout`.
pub fn default_database_busy_timeout_secs() -> u64 {
    5
}

/// Graceful shutdown timeout for the scheduler, matching the teacher's agent default.
pub fn default_graceful_shutdown_timeout_secs() -> u64 {
    30
}
