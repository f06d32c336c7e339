//! Local Concurrency Controller (§4.4, component C4)
//!
//! Bounded-concurrency fan-out over a list of URLs, grounded on the
//! semaphore + `JoinHandle` pattern used for bounded probing in the wider
//! corpus (dirust's scanner). Progress is reported over a channel rather
//! than a synchronous callback (Design Notes §9 "model as a channel of
//! progress snapshots consumed by the executor") so the consumer can do
//! async incremental persistence without blocking this loop.

use crate::probe::{self, ProbeOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One probe's completion, tagged with its position in the input slice so
/// the consumer can correlate it back to a (domain, template) mapping built
/// from the same slice (URLs are not unique — duplicate probing is
/// intentional, per the Design Notes).
pub type ProgressEvent = (usize, ProbeOutcome);

/// Runs probes for every URL with at most `concurrency` in flight, sending
/// a `ProgressEvent` on `progress` after each completion. Input order is
/// preserved in the returned vector regardless of completion order. If
/// `cancel` is triggered, no new probes are started; already in-flight
/// probes are awaited to completion (§4.4 cancellation).
pub async fn scan_batch(
    client: &reqwest::Client,
    urls: &[String],
    concurrency: usize,
    per_request_timeout: Duration,
    cancel: &CancellationToken,
    progress: UnboundedSender<ProgressEvent>,
) -> Vec<ProbeOutcome> {
    let total = urls.len();
    let mut slots: Vec<Option<ProbeOutcome>> = vec![None; total];
    if total == 0 {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let sample_counter = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, ProbeOutcome)>();

    let mut spawned = 0usize;
    for (idx, url) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let client = client.clone();
        let url = url.clone();
        let tx = tx.clone();
        let sample_counter = sample_counter.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let n = sample_counter.fetch_add(1, Ordering::Relaxed) as u64;
            let outcome = probe::probe(&client, &url, per_request_timeout, n).await;
            let _ = tx.send((idx, outcome));
        });
        spawned += 1;
    }
    drop(tx);

    for _ in 0..spawned {
        let Some((idx, outcome)) = rx.recv().await else {
            break;
        };
        let _ = progress.send((idx, outcome.clone()));
        slots[idx] = Some(outcome);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| ProbeOutcome {
                url: urls[idx].clone(),
                status: -1,
                content_type: None,
                size: None,
                response_time_ms: 0,
                error: Some("cancelled before probe started".to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_input_order_and_covers_every_url() {
        let client = reqwest::Client::new();
        let urls: Vec<String> = (0..5).map(|i| format!("http://192.0.2.1/{i}")).collect();
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = tokio::spawn({
            let urls = urls.clone();
            async move { scan_batch(&client, &urls, 2, Duration::from_millis(30), &cancel, tx).await }
        });

        let mut progress_calls = 0;
        while rx.recv().await.is_some() {
            progress_calls += 1;
        }
        let results = handle.await.unwrap();

        assert_eq!(results.len(), urls.len());
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.url, urls[i]);
        }
        assert_eq!(progress_calls, urls.len());
    }

    #[tokio::test]
    async fn empty_input_produces_empty_output() {
        let client = reqwest::Client::new();
        let cancel = CancellationToken::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let results = scan_batch(&client, &[], 4, Duration::from_millis(10), &cancel, tx).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_start_stops_new_probes() {
        let client = reqwest::Client::new();
        let urls: Vec<String> = (0..5).map(|i| format!("http://192.0.2.1/{i}")).collect();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let results = scan_batch(&client, &urls, 2, Duration::from_millis(30), &cancel, tx).await;
        assert_eq!(results.len(), urls.len());
        assert!(results.iter().all(|r| r.status == -1));
    }
}
