//! Error taxonomy for the domain scan engine
//!
//! The core never lets a single probe failure abort a batch (see
//! [`crate::task::ScanResult`]); `ScanError` exists for the control-flow
//! decisions that *do* need a typed discriminant — whether to retry, fail
//! over to local scanning, refuse a scan start, or fail a task outright.
//! Call sites that only need to propagate a failure with context use
//! `anyhow::Result` instead, the same split the rest of the workspace uses.

use thiserror::Error;

/// A reason a worker endpoint was permanently taken out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// The block message indicated the worker's proxy account was suspended.
    AccountBlocked,
    /// The block message indicated the worker's proxy was never deployed.
    NotDeployed,
}

impl DisabledReason {
    /// The stable string tag used in logs and persisted worker state.
    pub fn as_tag(&self) -> &'static str {
        match self {
            DisabledReason::AccountBlocked => "account_blocked",
            DisabledReason::NotDeployed => "not_deployed",
        }
    }
}

impl std::fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// The typed error taxonomy of the scan engine's control plane.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A template failed validation (an unsupported placeholder token was found).
    #[error("invalid template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A domain string could not be parsed into host/sld/tld parts.
    #[error("failed to parse domain {domain:?}: {reason}")]
    DomainParseFailure { domain: String, reason: String },

    /// Materializing a URL from a (template, domain) pair failed.
    #[error("failed to generate url from template {template:?} for domain {domain:?}: {reason}")]
    UrlGenerationFailure {
        template: String,
        domain: String,
        reason: String,
    },

    /// A worker response (or thrown transport error) signaled a permanent block.
    #[error("worker blocked: {reason}")]
    WorkerBlocked { reason: DisabledReason },

    /// A worker call failed without a block signal; caller should retry or fail over.
    #[error("worker request failed: {0}")]
    WorkerRequestError(String),

    /// A worker is temporarily excluded from selection due to rate limiting.
    #[error("worker rate limited until {until}")]
    WorkerRateLimited { until: chrono::DateTime<chrono::Utc> },

    /// A worker's daily quota has been exhausted.
    #[error("worker {worker_id} quota exhausted")]
    QuotaExhausted { worker_id: String },

    /// No worker was available for selection (strategy should fall back to local).
    #[error("worker pool is empty or has no eligible worker")]
    EmptyPool,

    /// A non-manual scan start was attempted while automation is disabled.
    #[error("automation is disabled")]
    AutomationDisabled,

    /// The referenced task does not exist.
    #[error("task {0} not found")]
    TaskNotFound(String),

    /// The referenced task exists but is not in `pending` status.
    #[error("task {0} is not pending")]
    TaskNotPending(String),

    /// A storage operation failed after exhausting its retry budget.
    #[error("storage error: {0}")]
    StorageError(String),
}
