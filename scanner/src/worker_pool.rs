//! Worker Pool (§4.6, component C6)
//!
//! Round-robin scheduler over remote worker endpoints. State lives behind a
//! `tokio::sync::RwLock`, the same sharing pattern the scheduler uses for
//! its task configuration — a single in-memory structure mutated under a
//! critical section on any endpoint state change (§5 shared-resource
//! policy).

use chrono::{DateTime, Utc};
use rand::Rng;
use shared::defaults::{
    default_rate_limit_cooldown_secs, default_unhealthy_threshold_pct, default_worker_daily_quota,
};
use shared::error::DisabledReason;
use shared::repository::WorkerRepository;
use shared::worker::WorkerEndpoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Next UTC midnight after `now`.
fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + chrono::Duration::days(1)).date_naive();
    tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always representable")
        .and_utc()
}

fn derive_id(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.replace('.', "_"),
            None => random_token(),
        },
        Err(_) => random_token(),
    }
}

fn random_token() -> String {
    let mut rng = rand::rng();
    (0..16).map(|_| format!("{:x}", rng.random_range(0..16))).collect()
}

pub struct WorkerPool {
    endpoints: RwLock<Vec<WorkerEndpoint>>,
    next_index: AtomicUsize,
    repository: Arc<dyn WorkerRepository>,
}

impl WorkerPool {
    /// Loads the pool from storage, resetting any endpoint whose
    /// `quota_reset_at` has already passed (§4.6 "on endpoint creation").
    pub async fn load(repository: Arc<dyn WorkerRepository>) -> anyhow::Result<Self> {
        let mut endpoints = repository.load_all().await?;
        let now = Utc::now();
        for endpoint in &mut endpoints {
            if now >= endpoint.quota_reset_at {
                endpoint.daily_usage = 0;
                endpoint.quota_reset_at = next_midnight(now);
                if !endpoint.permanently_disabled {
                    endpoint.healthy = true;
                }
            }
        }
        Ok(Self {
            endpoints: RwLock::new(endpoints),
            next_index: AtomicUsize::new(0),
            repository,
        })
    }

    /// Adds a new endpoint. The URL must parse and use the `https` scheme;
    /// adding an existing URL is a no-op.
    pub async fn add(&self, url: &str) -> anyhow::Result<()> {
        let parsed = url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid worker url {url:?}: {e}"))?;
        if parsed.scheme() != "https" {
            anyhow::bail!("worker url {url:?} must use https");
        }

        let mut endpoints = self.endpoints.write().await;
        if endpoints.iter().any(|e| e.url == url) {
            return Ok(());
        }

        let now = Utc::now();
        let endpoint = WorkerEndpoint::new(derive_id(url), url.to_string(), default_worker_daily_quota(), next_midnight(now));
        self.repository.upsert(&endpoint).await?;
        endpoints.push(endpoint);
        Ok(())
    }

    /// Round-robin selection over eligible endpoints (§4.6). Returns a clone
    /// of the selected endpoint's current state so callers don't hold the lock.
    pub async fn select(&self) -> Option<WorkerEndpoint> {
        let endpoints = self.endpoints.read().await;
        let now = Utc::now();
        let available: Vec<&WorkerEndpoint> = endpoints.iter().filter(|e| e.is_selectable(now)).collect();
        if available.is_empty() {
            return None;
        }
        let idx = self.next_index.fetch_add(1, Ordering::Relaxed) % available.len();
        Some(available[idx].clone())
    }

    pub async fn record_success(&self, id: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(e) = endpoints.iter_mut().find(|e| e.id == id) {
            e.success_count += 1;
            e.consecutive_failures = 0;
            if !e.healthy && e.error_rate() < default_unhealthy_threshold_pct() {
                e.healthy = true;
            }
        }
    }

    /// §4.6 failure recording: rescale counters once total requests exceed
    /// 100 so ancient failures don't permanently condemn an endpoint.
    pub async fn record_failure(&self, id: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(e) = endpoints.iter_mut().find(|e| e.id == id) {
            e.error_count += 1;
            e.consecutive_failures += 1;

            let total = e.success_count + e.error_count;
            if total > 100 {
                let success_ratio = e.success_count as f64 / total as f64;
                e.success_count = (success_ratio * 50.0).round() as u64;
                e.error_count = 50 - e.success_count;
            }

            if e.error_rate() >= default_unhealthy_threshold_pct() {
                e.healthy = false;
            }
        }
    }

    pub async fn record_rate_limited(&self, id: &str) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(e) = endpoints.iter_mut().find(|e| e.id == id) {
            e.rate_limited_until = Some(Utc::now() + chrono::Duration::seconds(default_rate_limit_cooldown_secs() as i64));
        }
    }

    pub async fn record_permanent_disable(&self, id: &str, reason: DisabledReason) -> anyhow::Result<()> {
        let mut endpoints = self.endpoints.write().await;
        if let Some(e) = endpoints.iter_mut().find(|e| e.id == id) {
            e.permanently_disabled = true;
            e.healthy = false;
            e.disabled_reason = Some(reason);
            warn!(worker_id = id, reason = %reason, "worker endpoint permanently disabled");
            self.repository.upsert(e).await?;
        }
        Ok(())
    }

    /// Adds `n` to the endpoint's usage and persists it. Marks the endpoint
    /// unhealthy once quota is reached (recoverable at reset).
    pub async fn increment_usage(&self, id: &str, n: u64) -> anyhow::Result<()> {
        let mut endpoints = self.endpoints.write().await;
        if let Some(e) = endpoints.iter_mut().find(|e| e.id == id) {
            e.daily_usage += n;
            if e.daily_usage >= e.daily_quota {
                e.healthy = false;
            }
            self.repository.upsert(e).await?;
        }
        Ok(())
    }

    /// §4.11: for any endpoint whose `quota_reset_at` has passed, zero usage,
    /// advance to the next UTC midnight, and restore health unless
    /// permanently disabled.
    pub async fn reset_daily_quotas(&self) -> anyhow::Result<()> {
        let mut endpoints = self.endpoints.write().await;
        let now = Utc::now();
        let mut reset_count = 0;
        for e in endpoints.iter_mut() {
            if e.quota_reset_at <= now {
                e.daily_usage = 0;
                e.quota_reset_at = next_midnight(now);
                if !e.permanently_disabled {
                    e.healthy = true;
                }
                self.repository.upsert(e).await?;
                reset_count += 1;
            }
        }
        if reset_count > 0 {
            info!(reset_count, "worker daily quotas reset");
        }
        Ok(())
    }

    pub async fn has_any_healthy(&self) -> bool {
        let endpoints = self.endpoints.read().await;
        let now = Utc::now();
        endpoints.iter().any(|e| e.is_selectable(now))
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeWorkerRepository {
        stored: StdMutex<Vec<WorkerEndpoint>>,
    }

    #[async_trait]
    impl WorkerRepository for FakeWorkerRepository {
        async fn load_all(&self) -> anyhow::Result<Vec<WorkerEndpoint>> {
            Ok(self.stored.lock().unwrap().clone())
        }
        async fn upsert(&self, worker: &WorkerEndpoint) -> anyhow::Result<()> {
            let mut stored = self.stored.lock().unwrap();
            if let Some(existing) = stored.iter_mut().find(|e| e.id == worker.id) {
                *existing = worker.clone();
            } else {
                stored.push(worker.clone());
            }
            Ok(())
        }
    }

    async fn pool_with(urls: &[&str]) -> WorkerPool {
        let repo = Arc::new(FakeWorkerRepository::default());
        let pool = WorkerPool::load(repo).await.unwrap();
        for url in urls {
            pool.add(url).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn round_robin_cycles_through_every_healthy_endpoint() {
        let pool = pool_with(&["https://w1.example", "https://w2.example", "https://w3.example"]).await;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pool.select().await.unwrap().id);
        }
        assert_eq!(seen[0..3], seen[3..6]);
        let mut unique = seen[0..3].to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[tokio::test]
    async fn rejects_non_https_url() {
        let pool = pool_with(&[]).await;
        assert!(pool.add("http://insecure.example").await.is_err());
    }

    #[tokio::test]
    async fn adding_existing_url_is_a_no_op() {
        let pool = pool_with(&["https://w1.example"]).await;
        pool.add("https://w1.example").await.unwrap();
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_marks_endpoint_unhealthy_and_unselectable() {
        let pool = pool_with(&["https://w1.example"]).await;
        let id = pool.select().await.unwrap().id;
        pool.increment_usage(&id, default_worker_daily_quota()).await.unwrap();
        assert!(pool.select().await.is_none());
    }

    #[tokio::test]
    async fn permanent_disable_removes_endpoint_from_rotation() {
        let pool = pool_with(&["https://w1.example"]).await;
        let id = pool.select().await.unwrap().id;
        pool.record_permanent_disable(&id, DisabledReason::AccountBlocked).await.unwrap();
        assert!(pool.select().await.is_none());
    }

    #[tokio::test]
    async fn failure_past_threshold_marks_unhealthy_then_success_recovers() {
        let pool = pool_with(&["https://w1.example"]).await;
        let id = pool.select().await.unwrap().id;
        for _ in 0..10 {
            pool.record_failure(&id).await;
        }
        assert!(pool.select().await.is_none());
        for _ in 0..100 {
            pool.record_success(&id).await;
        }
        assert!(pool.select().await.is_some());
    }
}
