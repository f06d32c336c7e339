//! The `WorkerEndpoint` entity (§3 Data Model)
//!
//! In-memory state owned exclusively by `scanner::worker_pool::WorkerPool`;
//! this module only holds the shape of it so it can be mirrored to and from
//! the repository without the pool depending on the storage layer's types.

use crate::error::DisabledReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    /// Derived from the URL host (`.` -> `_`), or a random token if the URL
    /// failed to parse on insert.
    pub id: String,
    /// Must be `https://`.
    pub url: String,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_failures: u64,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub daily_quota: u64,
    pub daily_usage: u64,
    pub quota_reset_at: DateTime<Utc>,
    pub permanently_disabled: bool,
    pub disabled_reason: Option<DisabledReason>,
}

impl WorkerEndpoint {
    pub fn new(id: String, url: String, daily_quota: u64, quota_reset_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            healthy: true,
            last_check: None,
            success_count: 0,
            error_count: 0,
            consecutive_failures: 0,
            rate_limited_until: None,
            daily_quota,
            daily_usage: 0,
            quota_reset_at,
            permanently_disabled: false,
            disabled_reason: None,
        }
    }

    /// Error rate in percent, `errorCount/(successCount+errorCount)*100`.
    /// Zero total requests is defined as a 0% error rate (an endpoint that
    /// has never been used is not unhealthy).
    pub fn error_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64 * 100.0
        }
    }

    /// Eligibility for round-robin selection (§4.6): not permanently
    /// disabled, healthy, under quota, and not currently rate-limited.
    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        if self.permanently_disabled || !self.healthy {
            return false;
        }
        if self.daily_usage >= self.daily_quota {
            return false;
        }
        match self.rate_limited_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}
