//! End-to-end scenario tests (§8 S1-S6), each driven over in-memory fakes
//! plus a tiny hand-rolled HTTP server for the cases that need a real
//! socket to probe against.

use crate::automation::AutomationController;
use crate::executor::TaskExecutor;
use crate::strategy::{LocalConcurrentConfig, ScanStrategy, WorkerBatchConfig};
use crate::worker_client::WorkerClient;
use crate::worker_pool::WorkerPool;
use async_trait::async_trait;
use chrono::Utc;
use shared::config::Settings;
use shared::domain::Domain;
use shared::error::ScanError;
use shared::repository::{
    DomainRepository, NewScanResult, NewTask, ResultRepository, SettingsRepository, TaskRepository, TemplateRepository,
    WorkerRepository,
};
use shared::task::{ScanTask, TaskStatus, TaskTarget};
use shared::template::PathTemplate;
use shared::worker::WorkerEndpoint;
use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// --- shared fakes, mirroring the per-module ones in executor.rs/scheduler.rs ---

#[derive(Default)]
struct FakeDomains {
    domains: StdMutex<Vec<Domain>>,
}

#[async_trait]
impl DomainRepository for FakeDomains {
    async fn count_unscanned(&self) -> anyhow::Result<i64> {
        Ok(self.domains.lock().unwrap().iter().filter(|d| !d.has_been_scanned).count() as i64)
    }
    async fn count_all(&self) -> anyhow::Result<i64> {
        Ok(self.domains.lock().unwrap().len() as i64)
    }
    async fn page(&self, target: TaskTarget, offset: i64, limit: i64) -> anyhow::Result<Vec<Domain>> {
        let domains = self.domains.lock().unwrap();
        let mut filtered: Vec<Domain> = domains
            .iter()
            .filter(|d| target == TaskTarget::Full || !d.has_been_scanned)
            .cloned()
            .collect();
        filtered.sort_by_key(|d| d.rank);
        Ok(filtered.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
    async fn mark_scanned(&self, ids: &[i64]) -> anyhow::Result<()> {
        for d in self.domains.lock().unwrap().iter_mut() {
            if ids.contains(&d.id) {
                d.has_been_scanned = true;
            }
        }
        Ok(())
    }
    async fn reset_all_scan_status(&self) -> anyhow::Result<()> {
        for d in self.domains.lock().unwrap().iter_mut() {
            d.has_been_scanned = false;
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeTasks {
    tasks: StdMutex<StdHashMap<i64, ScanTask>>,
    next_id: StdMutex<i64>,
}

#[async_trait]
impl TaskRepository for FakeTasks {
    async fn create(&self, task: NewTask) -> anyhow::Result<i64> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;
        let now = Utc::now();
        self.tasks.lock().unwrap().insert(
            id,
            ScanTask {
                id,
                name: task.name,
                target: task.target,
                url_template: task.url_template,
                status: TaskStatus::Pending,
                progress: 0,
                total_urls: 0,
                scanned_urls: 0,
                hits: 0,
                concurrency: task.concurrency,
                created_at: now,
                started_at: None,
                completed_at: None,
            },
        );
        Ok(id)
    }
    async fn get(&self, id: i64) -> anyhow::Result<Option<ScanTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }
    async fn update(&self, task: &ScanTask) -> anyhow::Result<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }
    async fn find_by_status(&self, statuses: &[TaskStatus]) -> anyhow::Result<Vec<ScanTask>> {
        Ok(self.tasks.lock().unwrap().values().filter(|t| statuses.contains(&t.status)).cloned().collect())
    }
    async fn reset_running_to_pending(&self) -> anyhow::Result<u64> {
        let mut count = 0;
        for t in self.tasks.lock().unwrap().values_mut() {
            if t.status == TaskStatus::Running {
                t.status = TaskStatus::Pending;
                count += 1;
            }
        }
        Ok(count)
    }
    async fn count_pending_or_running(&self) -> anyhow::Result<i64> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
            .count() as i64)
    }
}

#[derive(Default)]
struct FakeResults {
    rows: StdMutex<Vec<NewScanResult>>,
}

#[async_trait]
impl ResultRepository for FakeResults {
    async fn append_batch(&self, results: &[NewScanResult]) -> anyhow::Result<()> {
        self.rows.lock().unwrap().extend_from_slice(results);
        Ok(())
    }
}

#[derive(Default)]
struct FakeTemplates {
    templates: Vec<PathTemplate>,
}

#[async_trait]
impl TemplateRepository for FakeTemplates {
    async fn enabled(&self) -> anyhow::Result<Vec<PathTemplate>> {
        Ok(self.templates.iter().filter(|t| t.enabled).cloned().collect())
    }
}

#[derive(Default)]
struct FakeSettings {
    values: StdMutex<StdHashMap<String, String>>,
}

#[async_trait]
impl SettingsRepository for FakeSettings {
    async fn load(&self) -> anyhow::Result<Settings> {
        Ok(Settings::from_map(self.values.lock().unwrap().clone()))
    }
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeWorkers {
    stored: StdMutex<Vec<WorkerEndpoint>>,
}

#[async_trait]
impl WorkerRepository for FakeWorkers {
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

fn sample_domain(id: i64, name: &str, rank: i64) -> Domain {
    Domain::new(id, name, rank, Utc::now())
}

fn sample_template(id: i64, source: &str, expected_content_type: Option<&str>, min_size: i64) -> PathTemplate {
    let now = Utc::now();
    PathTemplate {
        id,
        name: format!("t{id}"),
        template: source.to_string(),
        description: None,
        expected_content_type: expected_content_type.map(str::to_string),
        exclude_content_type: false,
        min_size,
        max_size: None,
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

async fn build_executor(domains: Vec<Domain>, templates: Vec<PathTemplate>) -> (TaskExecutor, Arc<FakeTasks>, Arc<FakeResults>) {
    let domain_repo = Arc::new(FakeDomains { domains: StdMutex::new(domains) });
    let task_repo = Arc::new(FakeTasks::default());
    let result_repo = Arc::new(FakeResults::default());
    let template_repo = Arc::new(FakeTemplates { templates });
    let settings_repo = Arc::new(FakeSettings::default());
    let pool = Arc::new(WorkerPool::load(Arc::new(FakeWorkers::default())).await.unwrap());

    let executor = TaskExecutor::new(
        domain_repo,
        task_repo.clone(),
        result_repo.clone(),
        template_repo,
        settings_repo,
        pool,
        reqwest::Client::new(),
    );
    (executor, task_repo, result_repo)
}

/// Spawns a one-shot-per-connection raw HTTP server on an ephemeral port,
/// replying with `response` (a full `HTTP/1.1 ...` status line through
/// body) to every request it accepts, until the test drops the returned
/// guard's underlying task along with the runtime.
async fn spawn_http_mock(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn worker_success_body(n: usize) -> String {
    let entries: Vec<String> = (0..n)
        .map(|i| {
            format!(
                "{{\"url\":\"u{i}\",\"method\":\"head\",\"success\":true,\"status\":200,\
                 \"statusText\":\"OK\",\"ok\":true,\"responseTime\":\"5ms\",\"summary\":null,\
                 \"error\":null,\"errorType\":null,\"attempts\":1}}"
            )
        })
        .collect();
    format!("{{\"success\":true,\"total\":{n},\"timestamp\":null,\"results\":[{}]}}", entries.join(","))
}

fn http_ok(body: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body)
}

// --- S1: local scan, a passing 200 is persisted as a hit ---

#[tokio::test]
async fn s1_local_scan_persists_a_passing_hit() {
    let base = spawn_http_mock("HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: 2048\r\nConnection: close\r\n\r\n").await;
    let template_source = format!("{base}/backup.zip");

    let domain = sample_domain(1, "example.com", 1);
    let template = sample_template(1, &template_source, Some("application/zip"), 1024);
    let (executor, tasks, results) = build_executor(vec![domain], vec![template]).await;

    let task_id = tasks
        .create(NewTask {
            name: "s1".into(),
            target: TaskTarget::Incremental,
            url_template: template_source,
            concurrency: 4,
        })
        .await
        .unwrap();

    executor.execute_scan(task_id, true, true, CancellationToken::new()).await.unwrap();

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.hits, 1);
    assert_eq!(task.progress, 100);

    let rows = results.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, 200);
    assert_eq!(rows[0].size, 2048);
    assert_eq!(rows[0].content_type.as_deref(), Some("application/zip"));
}

// --- S2: a 200 that fails the template's content-type filter is dropped ---

#[tokio::test]
async fn s2_filter_rejects_a_200_with_the_wrong_content_type() {
    let base = spawn_http_mock("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 512\r\nConnection: close\r\n\r\n").await;
    let template_source = format!("{base}/backup.zip");

    let domain = sample_domain(1, "example.com", 1);
    let template = sample_template(1, &template_source, Some("application/zip"), 1024);
    let (executor, tasks, results) = build_executor(vec![domain], vec![template]).await;

    let task_id = tasks
        .create(NewTask {
            name: "s2".into(),
            target: TaskTarget::Incremental,
            url_template: template_source,
            concurrency: 4,
        })
        .await
        .unwrap();

    executor.execute_scan(task_id, true, true, CancellationToken::new()).await.unwrap();

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.hits, 0);
    assert!(results.rows.lock().unwrap().is_empty());
}

// --- S3: a blocked worker is permanently disabled and the sub-batch falls back to local ---

#[tokio::test]
async fn s3_worker_block_signal_disables_the_endpoint_and_falls_back_to_local() {
    let worker_base = spawn_http_mock("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 24\r\nConnection: close\r\n\r\naccount has been blocked").await;

    let endpoint = WorkerEndpoint::new("w1".into(), format!("{worker_base}/batch"), 1000, Utc::now() + chrono::Duration::days(1));
    let workers = Arc::new(FakeWorkers { stored: StdMutex::new(vec![endpoint]) });
    let pool = Arc::new(WorkerPool::load(workers).await.unwrap());

    let urls: Vec<String> = (0..4).map(|i| format!("http://192.0.2.1/{i}")).collect();
    let strategy = ScanStrategy::WorkerBatch(WorkerBatchConfig {
        pool: pool.clone(),
        client: WorkerClient::new(reqwest::Client::new()),
        batch_size: urls.len(),
        worker_timeout_ms: 5000,
        max_retries: 1,
        local: LocalConcurrentConfig {
            client: reqwest::Client::new(),
            concurrency: 2,
            probe_timeout: Duration::from_millis(50),
        },
    });

    let cancel = CancellationToken::new();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let results = strategy.scan_batch(&urls, &cancel, tx).await;

    assert_eq!(results.len(), urls.len(), "every url still gets exactly one result (P4)");
    assert!(!pool.has_any_healthy().await, "the block signal must permanently disable the only endpoint");
    assert!(pool.select().await.is_none());
}

// --- S4: quota exhaustion mid-batch hands the remaining sub-batches to local scanning ---

#[tokio::test]
async fn s4_quota_exhaustion_mid_batch_finishes_locally() {
    const BATCH_SIZE: usize = 10;
    let response_body: &'static str = Box::leak(http_ok(&worker_success_body(BATCH_SIZE)).into_boxed_str());
    let worker_base = spawn_http_mock(response_body).await;

    let endpoint = WorkerEndpoint::new("w1".into(), format!("{worker_base}/batch"), 30, Utc::now() + chrono::Duration::days(1));
    let workers = Arc::new(FakeWorkers { stored: StdMutex::new(vec![endpoint]) });
    let pool = Arc::new(WorkerPool::load(workers).await.unwrap());

    let urls: Vec<String> = (0..50).map(|i| format!("http://192.0.2.1/{i}")).collect();
    let strategy = ScanStrategy::WorkerBatch(WorkerBatchConfig {
        pool: pool.clone(),
        client: WorkerClient::new(reqwest::Client::new()),
        batch_size: BATCH_SIZE,
        worker_timeout_ms: 5000,
        max_retries: 1,
        local: LocalConcurrentConfig {
            client: reqwest::Client::new(),
            concurrency: 5,
            probe_timeout: Duration::from_millis(50),
        },
    });

    let cancel = CancellationToken::new();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let results = strategy.scan_batch(&urls, &cancel, tx).await;

    assert_eq!(results.len(), 50, "every url gets a result regardless of which path served it");
    let worker_served = results.iter().filter(|r| r.status == 200).count();
    let local_served = results.iter().filter(|r| r.status == -1).count();
    assert_eq!(worker_served, 30, "three sub-batches clear before the 30-request daily quota trips");
    assert_eq!(local_served, 20, "the remaining two sub-batches fail over to local scanning");
    assert!(!pool.has_any_healthy().await);
}

// --- S5: a non-manual start while automation is disabled is refused up front ---

#[tokio::test]
async fn s5_automation_disabled_refuses_a_non_manual_start() {
    let domain = sample_domain(1, "example.com", 1);
    let (executor, tasks, _results) = build_executor(vec![domain], vec![]).await;

    let task_id = tasks
        .create(NewTask {
            name: "s5".into(),
            target: TaskTarget::Incremental,
            url_template: "(domain)/x".into(),
            concurrency: 4,
        })
        .await
        .unwrap();

    let settings_repo = Arc::new(FakeSettings::default());
    let automation = AutomationController::load(settings_repo).await.unwrap();
    automation.disable().await.unwrap();

    let err = executor
        .execute_scan(task_id, false, automation.should_run().await, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::AutomationDisabled)));

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending, "a refused start must not touch task state");
}

// --- S6: an idle scheduler creates one incremental task, then a second tick is a no-op ---

#[tokio::test]
async fn s6_idle_scheduler_creates_one_task_then_single_flight_blocks_the_next_tick() {
    let tasks: Arc<dyn TaskRepository> = Arc::new(FakeTasks::default());
    let settings_repo: Arc<dyn SettingsRepository> = Arc::new(FakeSettings::default());
    let templates: Arc<dyn TemplateRepository> = Arc::new(FakeTemplates::default());
    let automation = Arc::new(AutomationController::load(settings_repo.clone()).await.unwrap());
    let (executor, _t, _r) = build_executor(vec![sample_domain(1, "example.com", 1)], vec![]).await;
    let executor = Arc::new(executor);

    crate::scheduler::check_and_run_incremental(&tasks, &settings_repo, &templates, &automation, &executor).await;
    let after_first = tasks.find_by_status(&[TaskStatus::Pending, TaskStatus::Running]).await.unwrap();
    assert_eq!(after_first.len(), 1, "the first tick on an idle engine must create exactly one task");

    crate::scheduler::check_and_run_incremental(&tasks, &settings_repo, &templates, &automation, &executor).await;
    let after_second = tasks.find_by_status(&[TaskStatus::Pending, TaskStatus::Running]).await.unwrap();
    assert_eq!(after_second.len(), 1, "hasRunningTask must block a second task while the first is still in flight");
}
