//! Task Scan Executor (§4.8, component C8)
//!
//! Drives one `ScanTask` from `pending` to `completed`/`failed`. Owns no
//! network or storage client directly — every dependency arrives as a
//! repository trait object or a pre-built `ScanStrategy`, so the page/batch
//! control flow here can be exercised against in-memory fakes.

use crate::date_range::safe_expand_date_ranges;
use crate::placeholder::{self, MaterializeOptions};
use crate::probe::ProbeOutcome;
use crate::strategy::{LocalConcurrentConfig, ScanStrategy, WorkerBatchConfig};
use crate::worker_client::WorkerClient;
use crate::worker_pool::WorkerPool;
use anyhow::{anyhow, Result};
use chrono::Utc;
use shared::defaults::{default_local_probe_timeout_secs, default_worker_max_retries};
use shared::error::ScanError;
use shared::repository::{
    DomainRepository, NewScanResult, ResultRepository, SettingsRepository, TaskRepository, TemplateRepository,
};
use shared::task::{ScanTask, TaskStatus, TaskTarget};
use shared::template::PathTemplate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DOMAIN_BATCH_SIZE: i64 = 1000;
const DOMAIN_FLUSH_SIZE: usize = 1000;
const STORAGE_RETRY_COUNT: u32 = 3;
const STORAGE_RETRY_BASE: Duration = Duration::from_secs(1);

/// One materialized URL's provenance, index-aligned with the URL batch
/// handed to the strategy. `template_source` is the pre-date-expansion
/// template string (the one `PathTemplate.template` rows are keyed by).
struct UrlOrigin {
    domain_id: i64,
    domain_name: String,
    template_source: String,
}

pub struct TaskExecutor {
    domains: Arc<dyn DomainRepository>,
    tasks: Arc<dyn TaskRepository>,
    results: Arc<dyn ResultRepository>,
    templates: Arc<dyn TemplateRepository>,
    settings: Arc<dyn SettingsRepository>,
    worker_pool: Arc<WorkerPool>,
    worker_client: WorkerClient,
    http_client: reqwest::Client,
}

impl TaskExecutor {
    pub fn new(
        domains: Arc<dyn DomainRepository>,
        tasks: Arc<dyn TaskRepository>,
        results: Arc<dyn ResultRepository>,
        templates: Arc<dyn TemplateRepository>,
        settings: Arc<dyn SettingsRepository>,
        worker_pool: Arc<WorkerPool>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            domains,
            tasks,
            results,
            templates,
            settings,
            worker_pool,
            worker_client: WorkerClient::new(http_client.clone()),
            http_client,
        }
    }

    /// Runs `taskId` to completion. `manual_start = false` is the path taken
    /// by the automation scheduler and is subject to the automation gate;
    /// `manual_start = true` (an operator-triggered start) bypasses it.
    pub async fn execute_scan(&self, task_id: i64, manual_start: bool, automation_enabled: bool, cancel: CancellationToken) -> Result<()> {
        if !manual_start && !automation_enabled {
            return Err(ScanError::AutomationDisabled.into());
        }

        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| ScanError::TaskNotFound(task_id.to_string()))?;
        if task.status != TaskStatus::Pending {
            return Err(ScanError::TaskNotPending(task_id.to_string()).into());
        }

        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        self.tasks.update(&task).await?;

        match self.run(&mut task, &cancel).await {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                self.tasks.update(&task).await?;
                info!(task_id, "scan task completed");
                Ok(())
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(Utc::now());
                if let Err(update_err) = self.tasks.update(&task).await {
                    error!(task_id, error = %update_err, "failed to persist failed task status");
                }
                error!(task_id, error = %err, "scan task failed");
                Err(err)
            }
        }
    }

    async fn run(&self, task: &mut ScanTask, cancel: &CancellationToken) -> Result<()> {
        let total_domains = match task.target {
            TaskTarget::Incremental => self.domains.count_unscanned().await?,
            TaskTarget::Full => self.domains.count_all().await?,
        };

        let template_list = task.templates();
        let num_templates = template_list.len() as i64;
        task.total_urls = total_domains.saturating_mul(num_templates);
        self.tasks.update(task).await?;

        let enabled_templates = self.templates.enabled().await?;
        let templates_by_source: HashMap<&str, &PathTemplate> =
            enabled_templates.iter().map(|t| (t.template.as_str(), t)).collect();

        let settings = self.settings.load().await?;
        let strategy = self.select_strategy(&settings, task).await;

        let mut offset = 0i64;
        let mut pending_domain_ids: Vec<i64> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                info!(task_id = task.id, "scan cancelled at page boundary");
                break;
            }

            let page = self.domains.page(task.target, offset, DOMAIN_BATCH_SIZE).await?;
            if page.is_empty() {
                break;
            }

            let (urls, origins) = self.materialize_page(&page, &template_list, task.id);

            let (page_scanned, page_hits) = self
                .run_batch(task.id, &strategy, &urls, &origins, &templates_by_source, cancel)
                .await?;

            for domain in &page {
                pending_domain_ids.push(domain.id);
            }
            if pending_domain_ids.len() >= DOMAIN_FLUSH_SIZE {
                self.domains.mark_scanned(&pending_domain_ids).await?;
                pending_domain_ids.clear();
            }

            task.scanned_urls += page_scanned;
            task.hits += page_hits;
            task.progress = ScanTask::compute_progress(total_domains, num_templates, task.scanned_urls);
            self.tasks.update(task).await?;

            debug!(
                task_id = task.id,
                scanned_urls = task.scanned_urls,
                hits = task.hits,
                progress = task.progress,
                "scan page complete"
            );

            if (page.len() as i64) < DOMAIN_BATCH_SIZE {
                break;
            }
            offset += DOMAIN_BATCH_SIZE;
        }

        if !pending_domain_ids.is_empty() {
            self.domains.mark_scanned(&pending_domain_ids).await?;
        }

        Ok(())
    }

    async fn select_strategy(&self, settings: &shared::config::Settings, task: &ScanTask) -> ScanStrategy {
        let local = LocalConcurrentConfig {
            client: self.http_client.clone(),
            concurrency: task.concurrency as usize,
            probe_timeout: Duration::from_secs(default_local_probe_timeout_secs()),
        };

        let worker_mode_ready =
            settings.enable_worker_mode() && self.worker_pool.len().await > 0 && self.worker_pool.has_any_healthy().await;

        if worker_mode_ready {
            ScanStrategy::WorkerBatch(WorkerBatchConfig {
                pool: self.worker_pool.clone(),
                client: self.worker_client.clone(),
                batch_size: settings.worker_batch_size() as usize,
                worker_timeout_ms: settings.worker_timeout_ms(),
                max_retries: default_worker_max_retries(),
                local,
            })
        } else {
            ScanStrategy::LocalConcurrent(local)
        }
    }

    /// Materializes every (domain x template) URL for one page, expanding
    /// date-range tokens first (C2) before substitution (C1). URL-generation
    /// failures are logged and skipped rather than aborting the page (§4.8
    /// step 7).
    fn materialize_page(&self, page: &[shared::domain::Domain], template_list: &[String], task_id: i64) -> (Vec<String>, Vec<UrlOrigin>) {
        let now = Utc::now();
        let mut urls = Vec::new();
        let mut origins = Vec::new();

        for domain in page {
            for template_source in template_list {
                let expansion = safe_expand_date_ranges(std::slice::from_ref(template_source), None);
                if expansion.truncated {
                    warn!(task_id, template = %template_source, "date range expansion truncated");
                }
                let opts = MaterializeOptions::new(now).with_rank(domain.rank);
                for expanded in &expansion.templates {
                    match placeholder::materialize(expanded, &domain.name, &opts) {
                        Ok(url) => {
                            urls.push(url);
                            origins.push(UrlOrigin {
                                domain_id: domain.id,
                                domain_name: domain.name.clone(),
                                template_source: template_source.clone(),
                            });
                        }
                        Err(err) => {
                            warn!(task_id, domain = %domain.name, template = %expanded, error = %err, "skipping url generation failure");
                        }
                    }
                }
            }
        }

        (urls, origins)
    }

    /// Runs one page's URL batch through `strategy`, persisting results
    /// incrementally as progress events arrive in contiguous order (Design
    /// Notes §9). Returns `(scanned_count, hits_count)` for the page.
    async fn run_batch(
        &self,
        task_id: i64,
        strategy: &ScanStrategy,
        urls: &[String],
        origins: &[UrlOrigin],
        templates_by_source: &HashMap<&str, &PathTemplate>,
        cancel: &CancellationToken,
    ) -> Result<(i64, i64)> {
        if urls.is_empty() {
            return Ok((0, 0));
        }

        let (tx, mut rx): (UnboundedSender<(usize, ProbeOutcome)>, _) = tokio::sync::mpsc::unbounded_channel();
        let scan_handle = {
            // `scan_batch` borrows `strategy`/`urls`/`cancel` for the duration of
            // the call; run it concurrently with progress consumption on this
            // same task rather than spawning, since none of the borrows are
            // 'static.
            strategy.scan_batch(urls, cancel, tx)
        };
        tokio::pin!(scan_handle);

        let mut slots: Vec<Option<ProbeOutcome>> = vec![None; urls.len()];
        let mut watermark = 0usize;
        let mut hits = 0i64;
        let mut scan_done = false;
        let mut final_results: Vec<ProbeOutcome> = Vec::new();

        loop {
            tokio::select! {
                biased;
                results = &mut scan_handle, if !scan_done => {
                    final_results = results;
                    scan_done = true;
                }
                event = rx.recv() => {
                    match event {
                        Some((idx, outcome)) => {
                            slots[idx] = Some(outcome);
                            let mut batch = Vec::new();
                            while watermark < slots.len() {
                                let Some(outcome) = slots[watermark].clone() else { break };
                                watermark += 1;
                                if let Some(result) = self.to_new_result(task_id, &origins[watermark - 1], &outcome, templates_by_source) {
                                    if result.status == 200 {
                                        hits += 1;
                                    }
                                    batch.push(result);
                                }
                            }
                            if !batch.is_empty() {
                                self.persist_with_retry(&batch).await?;
                            }
                        }
                        None if scan_done => break,
                        None => continue,
                    }
                }
            }
        }

        // Defensive flush: cover any indices the progress channel didn't
        // report before closing (shouldn't happen in practice, since every
        // strategy implementation sends one event per URL).
        if watermark < final_results.len() {
            for (idx, outcome) in final_results.iter().enumerate().skip(watermark) {
                slots[idx] = Some(outcome.clone());
            }
            let mut batch = Vec::new();
            while watermark < slots.len() {
                let Some(outcome) = slots[watermark].clone() else { break };
                watermark += 1;
                if let Some(result) = self.to_new_result(task_id, &origins[watermark - 1], &outcome, templates_by_source) {
                    if result.status == 200 {
                        hits += 1;
                    }
                    batch.push(result);
                }
            }
            if !batch.is_empty() {
                self.persist_with_retry(&batch).await?;
            }
        }

        Ok((urls.len() as i64, hits))
    }

    /// Applies the §4.8 persistence filter: non-200 results are always kept;
    /// 200s are dropped when they fail the matching template's content-type
    /// or size bounds. A null size is persisted as `0` (P8's "never coerced
    /// to 0" applies only to the in-memory `ParsedWorkerResult`, not storage).
    fn to_new_result(
        &self,
        task_id: i64,
        origin: &UrlOrigin,
        outcome: &ProbeOutcome,
        templates_by_source: &HashMap<&str, &PathTemplate>,
    ) -> Option<NewScanResult> {
        if outcome.status == 200 {
            if let Some(template) = templates_by_source.get(origin.template_source.as_str()) {
                if template.evaluate(outcome.content_type.as_deref(), outcome.size).is_err() {
                    return None;
                }
            }
        }

        Some(NewScanResult {
            task_id,
            domain: origin.domain_name.clone(),
            url: outcome.url.clone(),
            status: outcome.status,
            content_type: outcome.content_type.clone(),
            size: outcome.size.unwrap_or(0),
            scanned_at: Utc::now(),
        })
    }

    /// §7 `StorageError`: retry up to `STORAGE_RETRY_COUNT` times with
    /// exponential backoff (base 1s, doubling) before surfacing the failure,
    /// which fails the task.
    async fn persist_with_retry(&self, batch: &[NewScanResult]) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.results.append_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < STORAGE_RETRY_COUNT => {
                    attempt += 1;
                    let backoff = STORAGE_RETRY_BASE * 2u32.pow(attempt - 1);
                    warn!(attempt, error = %err, "result batch append failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(anyhow!("result batch append failed after {STORAGE_RETRY_COUNT} retries: {err}")),
            }
        }
    }
}
