//! Automation Scheduler (§4.10, component C10)
//!
//! Installs the hourly incremental tick and the daily rescan tick the
//! teacher's `TaskScheduler` installed per-monitoring-task, generalized
//! here to the two automation ticks this engine runs. Both ticks fire
//! immediately on `start` and then on their period; `start` is idempotent,
//! restarting any previously-installed ticks.

use crate::automation::AutomationController;
use crate::executor::TaskExecutor;
use anyhow::Result;
use chrono::Utc;
use shared::automation::{INCREMENTAL_PERIOD, RESCAN_PERIOD};
use shared::config::Settings;
use shared::repository::{NewTask, SettingsRepository, TaskRepository, TemplateRepository};
use shared::task::{TaskStatus, TaskTarget};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const INCREMENTAL_TICK_PERIOD: tokio::time::Duration = tokio::time::Duration::from_secs(60 * 60);
const RESCAN_TICK_PERIOD: tokio::time::Duration = tokio::time::Duration::from_secs(24 * 60 * 60);
const SETTINGS_KEY_LAST_INCREMENTAL: &str = "automation_last_incremental";
const SETTINGS_KEY_LAST_RESCAN: &str = "automation_last_rescan";
const TASK_START_STAGGER: tokio::time::Duration = tokio::time::Duration::from_secs(1);

pub struct AutomationScheduler {
    tasks: Arc<dyn TaskRepository>,
    settings: Arc<dyn SettingsRepository>,
    templates: Arc<dyn TemplateRepository>,
    automation: Arc<AutomationController>,
    executor: Arc<TaskExecutor>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl AutomationScheduler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        settings: Arc<dyn SettingsRepository>,
        templates: Arc<dyn TemplateRepository>,
        automation: Arc<AutomationController>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            tasks,
            settings,
            templates,
            automation,
            executor,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// §4.10: reads current config, installs whichever ticks are enabled.
    /// Calling this while already running restarts both ticks.
    pub async fn start(&mut self) -> Result<()> {
        self.stop();
        self.cancel = CancellationToken::new();
        info!("automation scheduler starting");

        let settings = self.settings.load().await?;

        if settings.automation_incremental_enabled() {
            let scheduler = self.spawn_incremental_tick();
            self.handles.push(scheduler);
        }
        if settings.automation_rescan_enabled() {
            let scheduler = self.spawn_rescan_tick();
            self.handles.push(scheduler);
        }

        Ok(())
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    fn spawn_incremental_tick(&self) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        let settings = self.settings.clone();
        let templates = self.templates.clone();
        let automation = self.automation.clone();
        let executor = self.executor.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            check_and_run_incremental(&tasks, &settings, &templates, &automation, &executor).await;
            let mut interval = tokio::time::interval(INCREMENTAL_TICK_PERIOD);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        check_and_run_incremental(&tasks, &settings, &templates, &automation, &executor).await;
                    }
                }
            }
        })
    }

    fn spawn_rescan_tick(&self) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        let settings = self.settings.clone();
        let templates = self.templates.clone();
        let automation = self.automation.clone();
        let executor = self.executor.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            check_and_run_rescan(&tasks, &settings, &templates, &automation, &executor).await;
            let mut interval = tokio::time::interval(RESCAN_TICK_PERIOD);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        check_and_run_rescan(&tasks, &settings, &templates, &automation, &executor).await;
                    }
                }
            }
        })
    }
}

/// §4.10 `hasRunningTask`: resets stale `running` tasks to `pending` first
/// (they were interrupted by a prior process), then answers whether any
/// task is still pending or running. Fails open (returns `false`) on
/// storage error so a transient glitch can't wedge automation forever.
pub(crate) async fn has_running_task(tasks: &Arc<dyn TaskRepository>) -> bool {
    match tasks.reset_running_to_pending().await {
        Ok(reset_count) if reset_count > 0 => {
            info!(reset_count, "reset stale running tasks to pending on startup check");
        }
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "failed to reset stale running tasks; assuming none are stale");
        }
    }

    match tasks.count_pending_or_running().await {
        Ok(count) => count > 0,
        Err(err) => {
            warn!(error = %err, "hasRunningTask storage check failed, failing open");
            false
        }
    }
}

fn build_template_list(settings: &Settings, enabled_template_sources: &[String]) -> String {
    if enabled_template_sources.is_empty() {
        settings.default_url_template()
    } else {
        enabled_template_sources.join(",")
    }
}

pub(crate) async fn check_and_run_incremental(
    tasks: &Arc<dyn TaskRepository>,
    settings_repo: &Arc<dyn SettingsRepository>,
    templates: &Arc<dyn TemplateRepository>,
    automation: &Arc<AutomationController>,
    executor: &Arc<TaskExecutor>,
) {
    if !automation.should_run().await {
        return;
    }
    if has_running_task(tasks).await {
        return;
    }

    let settings = match settings_repo.load().await {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to load settings for incremental check");
            return;
        }
    };

    let last_run = settings.automation_last_incremental().and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok());
    let due = match last_run {
        None => true,
        Some(last) => Utc::now() - last > INCREMENTAL_PERIOD,
    };
    if !due {
        return;
    }

    // Domain-sync against the external CSV source is out of scope for this
    // engine (§1 non-goals); the task targets whatever domains storage
    // currently has.
    let enabled_sources = match templates.enabled().await {
        Ok(list) => list.iter().map(|t| t.template.clone()).collect::<Vec<_>>(),
        Err(err) => {
            warn!(error = %err, "failed to load enabled templates for incremental scan, falling back to default");
            Vec::new()
        }
    };
    let url_template = build_template_list(&settings, &enabled_sources);
    let new_task = NewTask {
        name: format!("Auto Incremental Scan - {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        target: TaskTarget::Incremental,
        url_template,
        concurrency: settings.default_concurrency(),
    };

    match tasks.create(new_task).await {
        Ok(task_id) => {
            info!(task_id, "starting automatic incremental scan");
            spawn_task_run(executor, task_id, automation.clone());
            if let Err(err) = settings_repo.set(SETTINGS_KEY_LAST_INCREMENTAL, &Utc::now().to_rfc3339()).await {
                warn!(error = %err, "failed to persist last incremental run timestamp");
            }
        }
        Err(err) => warn!(error = %err, "failed to create automatic incremental task"),
    }
}

async fn check_and_run_rescan(
    tasks: &Arc<dyn TaskRepository>,
    settings_repo: &Arc<dyn SettingsRepository>,
    templates: &Arc<dyn TemplateRepository>,
    automation: &Arc<AutomationController>,
    executor: &Arc<TaskExecutor>,
) {
    if !automation.should_run().await {
        return;
    }
    if has_running_task(tasks).await {
        return;
    }

    let settings = match settings_repo.load().await {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to load settings for rescan check");
            return;
        }
    };

    let last_run = settings.automation_last_rescan().and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok());
    let due = match last_run {
        None => true,
        Some(last) => Utc::now() - last > RESCAN_PERIOD,
    };
    if !due {
        return;
    }

    let enabled_sources = match templates.enabled().await {
        Ok(list) => list.iter().map(|t| t.template.clone()).collect::<Vec<_>>(),
        Err(err) => {
            warn!(error = %err, "failed to load enabled templates for rescan, falling back to default");
            Vec::new()
        }
    };
    let url_template = build_template_list(&settings, &enabled_sources);
    let new_task = NewTask {
        name: format!("Auto Full Rescan - {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        target: TaskTarget::Full,
        url_template,
        concurrency: settings.default_concurrency(),
    };

    match tasks.create(new_task).await {
        Ok(task_id) => {
            info!(task_id, "starting automatic full rescan");
            spawn_task_run(executor, task_id, automation.clone());
            if let Err(err) = settings_repo.set(SETTINGS_KEY_LAST_RESCAN, &Utc::now().to_rfc3339()).await {
                warn!(error = %err, "failed to persist last rescan run timestamp");
            }
        }
        Err(err) => warn!(error = %err, "failed to create automatic rescan task"),
    }
}

fn spawn_task_run(executor: &Arc<TaskExecutor>, task_id: i64, automation: Arc<AutomationController>) {
    let executor = executor.clone();
    tokio::spawn(async move {
        let enabled = automation.should_run().await;
        if let Err(err) = executor.execute_scan(task_id, false, enabled, CancellationToken::new()).await {
            warn!(task_id, error = %err, "automatic scan task failed");
        }
    });
}

/// Resumability at startup (§4.8 "Resumability"): resets interrupted tasks
/// and restarts every pending/running one in the background, staggered by
/// one second each so they don't all hit storage in the same instant.
pub async fn resume_interrupted_tasks(
    tasks: &Arc<dyn TaskRepository>,
    executor: &Arc<TaskExecutor>,
    automation: &Arc<AutomationController>,
) -> Result<()> {
    let reset_count = tasks.reset_running_to_pending().await?;
    if reset_count > 0 {
        info!(reset_count, "reset interrupted running tasks to pending at startup");
    }

    let pending = tasks.find_by_status(&[TaskStatus::Pending]).await?;
    for (i, task) in pending.into_iter().enumerate() {
        let executor = executor.clone();
        let automation = automation.clone();
        let delay = TASK_START_STAGGER * i as u32;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let enabled = automation.should_run().await;
            if let Err(err) = executor.execute_scan(task.id, false, enabled, CancellationToken::new()).await {
                warn!(task_id = task.id, error = %err, "resumed scan task failed");
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeTasks {
        pending_or_running: StdMutex<i64>,
        reset_calls: StdMutex<u64>,
    }

    #[async_trait]
    impl TaskRepository for FakeTasks {
        async fn create(&self, _task: NewTask) -> Result<i64> {
            Ok(1)
        }
        async fn get(&self, _id: i64) -> Result<Option<shared::task::ScanTask>> {
            Ok(None)
        }
        async fn update(&self, _task: &shared::task::ScanTask) -> Result<()> {
            Ok(())
        }
        async fn find_by_status(&self, _statuses: &[TaskStatus]) -> Result<Vec<shared::task::ScanTask>> {
            Ok(Vec::new())
        }
        async fn reset_running_to_pending(&self) -> Result<u64> {
            Ok(*self.reset_calls.lock().unwrap())
        }
        async fn count_pending_or_running(&self) -> Result<i64> {
            Ok(*self.pending_or_running.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct FakeSettings {
        values: StdMutex<StdHashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsRepository for FakeSettings {
        async fn load(&self) -> Result<Settings> {
            Ok(Settings::from_map(self.values.lock().unwrap().clone()))
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn has_running_task_fails_open_when_storage_errors() {
        struct ErroringTasks;
        #[async_trait]
        impl TaskRepository for ErroringTasks {
            async fn create(&self, _task: NewTask) -> Result<i64> {
                unreachable!()
            }
            async fn get(&self, _id: i64) -> Result<Option<shared::task::ScanTask>> {
                unreachable!()
            }
            async fn update(&self, _task: &shared::task::ScanTask) -> Result<()> {
                unreachable!()
            }
            async fn find_by_status(&self, _statuses: &[TaskStatus]) -> Result<Vec<shared::task::ScanTask>> {
                unreachable!()
            }
            async fn reset_running_to_pending(&self) -> Result<u64> {
                Err(anyhow::anyhow!("storage unavailable"))
            }
            async fn count_pending_or_running(&self) -> Result<i64> {
                Err(anyhow::anyhow!("storage unavailable"))
            }
        }

        let tasks: Arc<dyn TaskRepository> = Arc::new(ErroringTasks);
        assert!(!has_running_task(&tasks).await);
    }

    #[tokio::test]
    async fn has_running_task_resets_stale_rows_then_reports_pending() {
        let tasks: Arc<dyn TaskRepository> = Arc::new(FakeTasks {
            pending_or_running: StdMutex::new(1),
            reset_calls: StdMutex::new(2),
        });
        assert!(has_running_task(&tasks).await);
    }

    #[test]
    fn build_template_list_falls_back_to_default_when_no_templates_enabled() {
        let settings = Settings::default();
        assert_eq!(build_template_list(&settings, &[]), settings.default_url_template());
    }
}
