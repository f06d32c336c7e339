//! Worker Client (§4.5, component C5)
//!
//! Talks to one remote HTTP-proxy endpoint over the batch JSON protocol of
//! §6. Block detection inspects every string the wire protocol could carry
//! an operator message in — a thrown transport error, the response
//! envelope, or any per-URL `error` field — by scanning the raw response
//! text before it is ever deserialized.

use serde::{Deserialize, Serialize};
use shared::error::{DisabledReason, ScanError};
use std::time::Duration;

const BLOCKED_NOT_DEPLOYED: &str = "there is nothing here yet";
const BLOCKED_ACCOUNT: &str = "account has been blocked";

/// §6 wire request body.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRequest<'a> {
    pub urls: &'a [String],
    pub method: &'a str,
    pub timeout: u64,
    pub retry: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerResultSummary {
    #[serde(rename = "contentLength")]
    pub content_length: Option<String>,
    #[serde(rename = "contentLengthBytes")]
    pub content_length_bytes: Option<i64>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    #[serde(rename = "supportResume")]
    pub support_resume: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerResultEntry {
    pub url: String,
    pub method: String,
    pub success: bool,
    pub status: Option<i64>,
    #[serde(rename = "statusText")]
    pub status_text: Option<String>,
    pub ok: Option<bool>,
    #[serde(rename = "responseTime")]
    pub response_time: Option<String>,
    pub summary: Option<WorkerResultSummary>,
    pub error: Option<String>,
    #[serde(rename = "errorType")]
    pub error_type: Option<String>,
    pub attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerBatchResponse {
    pub success: bool,
    pub total: u32,
    pub timestamp: Option<String>,
    pub results: Vec<WorkerResultEntry>,
}

/// The internal `ScanResult` shape parsed out of one `WorkerResultEntry`
/// (§4.5 "parsing to the internal ScanResult shape").
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWorkerResult {
    pub url: String,
    pub status: i32,
    pub content_type: Option<String>,
    /// `summary.contentLengthBytes`; `None` when absent, never coerced to 0 (P8).
    pub size: Option<i64>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

/// Parses a leading run of ASCII digits off a string like `"1359ms"`.
fn parse_leading_integer(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

pub fn parse_worker_result(entry: &WorkerResultEntry) -> ParsedWorkerResult {
    ParsedWorkerResult {
        url: entry.url.clone(),
        status: entry.status.map(|s| s as i32).unwrap_or(-1),
        content_type: entry.summary.as_ref().and_then(|s| s.content_type.clone()),
        size: entry.summary.as_ref().and_then(|s| s.content_length_bytes),
        response_time_ms: entry.response_time.as_deref().and_then(parse_leading_integer),
        error: if entry.success { None } else { entry.error.clone() },
    }
}

/// §4.5/P7 block detection: scans a lowercased haystack for either signal.
pub fn detect_block_signal(haystack: &str) -> Option<DisabledReason> {
    let lowered = haystack.to_lowercase();
    if lowered.contains(BLOCKED_ACCOUNT) {
        Some(DisabledReason::AccountBlocked)
    } else if lowered.contains(BLOCKED_NOT_DEPLOYED) {
        Some(DisabledReason::NotDeployed)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
}

impl WorkerClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Sends one batch request to `worker_url`. The overall call timeout is
    /// `⌊timeout/1000⌋` seconds, as the caller (strategy) derives from the
    /// configured `worker_timeout` (ms).
    pub async fn send_batch(
        &self,
        worker_url: &str,
        urls: &[String],
        method: &str,
        timeout_secs: u64,
        retry: u32,
    ) -> Result<WorkerBatchResponse, ScanError> {
        let body = WorkerRequest {
            urls,
            method,
            timeout: timeout_secs,
            retry,
            preview: None,
        };

        let response = self
            .http
            .post(worker_url)
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                let text = err.to_string();
                match detect_block_signal(&text) {
                    Some(reason) => ScanError::WorkerBlocked { reason },
                    None => ScanError::WorkerRequestError(text),
                }
            })?;

        let text = response
            .text()
            .await
            .map_err(|err| ScanError::WorkerRequestError(err.to_string()))?;

        if let Some(reason) = detect_block_signal(&text) {
            return Err(ScanError::WorkerBlocked { reason });
        }

        serde_json::from_str::<WorkerBatchResponse>(&text)
            .map_err(|err| ScanError::WorkerRequestError(format!("malformed worker response: {err}")))
    }

    /// §4.5 health check: a single well-known URL, 5s timeout, no retry.
    /// Returns `Ok(true)` when healthy, `Ok(false)` with the block reason
    /// (if one was signaled) otherwise.
    pub async fn health_check(&self, worker_url: &str) -> (bool, Option<DisabledReason>) {
        let probe_url = vec!["https://www.google.com".to_string()];
        match self.send_batch(worker_url, &probe_url, "head", 5, 0).await {
            Ok(_) => (true, None),
            Err(ScanError::WorkerBlocked { reason }) => (false, Some(reason)),
            Err(_) => (false, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_account_blocked_case_insensitively() {
        assert_eq!(
            detect_block_signal("Your Account Has Been Blocked, contact support"),
            Some(DisabledReason::AccountBlocked)
        );
    }

    #[test]
    fn detects_not_deployed() {
        assert_eq!(
            detect_block_signal("Error: there is nothing here yet"),
            Some(DisabledReason::NotDeployed)
        );
    }

    #[test]
    fn no_signal_returns_none() {
        assert_eq!(detect_block_signal("ordinary timeout error"), None);
    }

    #[test]
    fn parses_leading_integer_from_millisecond_string() {
        assert_eq!(parse_leading_integer("1359ms"), Some(1359));
        assert_eq!(parse_leading_integer("ms"), None);
    }

    #[test]
    fn missing_content_length_bytes_parses_to_none_not_zero() {
        let entry = WorkerResultEntry {
            url: "https://example.com".into(),
            method: "head".into(),
            success: true,
            status: Some(200),
            status_text: None,
            ok: Some(true),
            response_time: Some("50ms".into()),
            summary: Some(WorkerResultSummary {
                content_length: None,
                content_length_bytes: None,
                content_type: Some("text/html".into()),
                support_resume: None,
            }),
            error: None,
            error_type: None,
            attempts: Some(1),
        };
        let parsed = parse_worker_result(&entry);
        assert_eq!(parsed.size, None);
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.response_time_ms, Some(50));
    }

    #[test]
    fn failed_entry_carries_error_message() {
        let entry = WorkerResultEntry {
            url: "https://example.com".into(),
            method: "head".into(),
            success: false,
            status: None,
            status_text: None,
            ok: Some(false),
            response_time: None,
            summary: None,
            error: Some("connection reset".into()),
            error_type: Some("network".into()),
            attempts: Some(3),
        };
        let parsed = parse_worker_result(&entry);
        assert_eq!(parsed.status, -1);
        assert_eq!(parsed.error.as_deref(), Some("connection reset"));
    }
}
