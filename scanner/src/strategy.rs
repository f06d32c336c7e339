//! Scan Strategy (§4.7, component C7)
//!
//! Modeled as a capability enum with two variants rather than a class
//! hierarchy (Design Notes §9): `LocalConcurrent` delegates to the Local
//! Concurrency Controller; `WorkerBatch` fans sub-batches out to the worker
//! pool with per-sub-batch retry and local fallback, guaranteeing exactly
//! one result per input URL (P4) regardless of worker failures. Progress is
//! reported over a channel, same as the Local Concurrency Controller, so
//! the executor can persist results incrementally without this loop
//! depending on storage.

use crate::local_concurrency::{self, ProgressEvent};
use crate::probe::ProbeOutcome;
use crate::worker_client::{parse_worker_result, WorkerClient};
use crate::worker_pool::WorkerPool;
use shared::error::ScanError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct LocalConcurrentConfig {
    pub client: reqwest::Client,
    pub concurrency: usize,
    pub probe_timeout: Duration,
}

pub struct WorkerBatchConfig {
    pub pool: Arc<WorkerPool>,
    pub client: WorkerClient,
    pub batch_size: usize,
    pub worker_timeout_ms: u64,
    pub max_retries: u32,
    /// Fallback local controller, used per sub-batch when the pool is empty
    /// or retries are exhausted.
    pub local: LocalConcurrentConfig,
}

pub enum ScanStrategy {
    LocalConcurrent(LocalConcurrentConfig),
    WorkerBatch(WorkerBatchConfig),
}

fn parsed_to_outcome(parsed: crate::worker_client::ParsedWorkerResult) -> ProbeOutcome {
    ProbeOutcome {
        url: parsed.url,
        status: parsed.status,
        content_type: parsed.content_type,
        size: parsed.size,
        response_time_ms: parsed.response_time_ms.unwrap_or(0),
        error: parsed.error,
    }
}

impl ScanStrategy {
    /// Runs every URL through this strategy, sending a `ProgressEvent`
    /// (the URL's position in `urls`, plus its outcome) on `progress` as
    /// each unit of work completes (a single probe for local mode, a whole
    /// sub-batch at once for worker mode). Always returns `len(urls)`
    /// results (P4), in input order.
    pub async fn scan_batch(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Vec<ProbeOutcome> {
        match self {
            ScanStrategy::LocalConcurrent(cfg) => {
                local_concurrency::scan_batch(&cfg.client, urls, cfg.concurrency, cfg.probe_timeout, cancel, progress).await
            }
            ScanStrategy::WorkerBatch(cfg) => {
                let mut accumulated = Vec::with_capacity(urls.len());
                for (chunk_start, chunk) in urls.chunks(cfg.batch_size.max(1)).scan(0usize, |offset, chunk| {
                    let start = *offset;
                    *offset += chunk.len();
                    Some((start, chunk))
                }) {
                    let sub_results = Self::run_sub_batch(cfg, chunk, cancel).await;
                    for (i, outcome) in sub_results.into_iter().enumerate() {
                        let _ = progress.send((chunk_start + i, outcome.clone()));
                        accumulated.push(outcome);
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                }
                // Cancellation mid-loop can leave a tail unprocessed; fill it
                // with synthetic failures so the P4 invariant still holds.
                while accumulated.len() < urls.len() {
                    let idx = accumulated.len();
                    let outcome = ProbeOutcome {
                        url: urls[idx].clone(),
                        status: -1,
                        content_type: None,
                        size: None,
                        response_time_ms: 0,
                        error: Some("cancelled before probe started".to_string()),
                    };
                    let _ = progress.send((idx, outcome.clone()));
                    accumulated.push(outcome);
                }
                accumulated
            }
        }
    }

    async fn run_sub_batch(cfg: &WorkerBatchConfig, sub_batch: &[String], cancel: &CancellationToken) -> Vec<ProbeOutcome> {
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let timeout_secs = (cfg.worker_timeout_ms / 1000).max(1);
        let mut attempts = 0u32;

        loop {
            let Some(worker) = cfg.pool.select().await else {
                return Self::local_fallback(&cfg.local, sub_batch, cancel).await;
            };

            match cfg
                .client
                .send_batch(&worker.url, sub_batch, "head", timeout_secs, 2)
                .await
            {
                Ok(response) => {
                    cfg.pool.record_success(&worker.id).await;
                    if let Err(err) = cfg.pool.increment_usage(&worker.id, sub_batch.len() as u64).await {
                        warn!(worker_id = %worker.id, error = %err, "failed to persist worker usage");
                    }
                    return response.results.iter().map(parse_worker_result).map(parsed_to_outcome).collect();
                }
                Err(ScanError::WorkerBlocked { reason }) => {
                    if let Err(err) = cfg.pool.record_permanent_disable(&worker.id, reason).await {
                        warn!(worker_id = %worker.id, error = %err, "failed to persist permanent disable");
                    }
                    // Retry without consuming the retry budget.
                    continue;
                }
                Err(_) => {
                    cfg.pool.record_failure(&worker.id).await;
                    attempts += 1;
                    if attempts > cfg.max_retries {
                        return Self::local_fallback(&cfg.local, sub_batch, cancel).await;
                    }
                }
            }
        }
    }

    async fn local_fallback(local: &LocalConcurrentConfig, sub_batch: &[String], cancel: &CancellationToken) -> Vec<ProbeOutcome> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        local_concurrency::scan_batch(&local.client, sub_batch, local.concurrency, local.probe_timeout, cancel, tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_strategy_returns_one_result_per_url() {
        let urls: Vec<String> = (0..4).map(|i| format!("http://192.0.2.1/{i}")).collect();
        let strategy = ScanStrategy::LocalConcurrent(LocalConcurrentConfig {
            client: reqwest::Client::new(),
            concurrency: 2,
            probe_timeout: Duration::from_millis(30),
        });
        let cancel = CancellationToken::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let results = strategy.scan_batch(&urls, &cancel, tx).await;
        assert_eq!(results.len(), urls.len());
    }
}
