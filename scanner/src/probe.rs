//! HTTP Probe (§4.3, component C3)
//!
//! Issues a single `HEAD` against a URL with a per-request timeout. Never
//! returns `Err`: a timeout or transport failure is folded into
//! `ProbeOutcome { status: -1, error: Some(..) }` so callers (the local
//! concurrency controller, the worker fallback path) can always place one
//! result per input URL, per P4.

use shared::defaults::default_user_agent;
use std::time::{Duration, Instant};
use tracing::debug;

/// The outcome of one probe. `status == -1` denotes timeout/network error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub url: String,
    pub status: i32,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Log roughly 1% of probes (§4.3 "never log every probe"). A fixed modulus
/// over a shared counter is adequate; exact uniformity is not required.
fn should_sample(counter: u64) -> bool {
    counter % 100 == 0
}

/// Performs one `HEAD` request with `timeout`, returning a result that is
/// always present regardless of outcome.
pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration, sample_counter: u64) -> ProbeOutcome {
    let started = Instant::now();

    let result = client
        .head(url)
        .timeout(timeout)
        .header(reqwest::header::USER_AGENT, default_user_agent())
        .send()
        .await;

    let response_time_ms = started.elapsed().as_millis() as u64;
    let sampled = should_sample(sample_counter);

    match result {
        Ok(response) => {
            let status = response.status().as_u16() as i32;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let size = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());

            if sampled {
                debug!(url, status, response_time_ms, "probe completed");
            }

            ProbeOutcome {
                url: url.to_string(),
                status,
                content_type,
                size,
                response_time_ms,
                error: None,
            }
        }
        Err(err) => {
            let error = if err.is_timeout() {
                "timeout".to_string()
            } else {
                err.to_string()
            };

            if sampled {
                debug!(url, error = %error, response_time_ms, "probe failed");
            }

            ProbeOutcome {
                url: url.to_string(),
                status: -1,
                content_type: None,
                size: None,
                response_time_ms,
                error: Some(error),
            }
        }
    }
}
