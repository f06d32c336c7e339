//! Domain Scan Engine
//!
//! Probes ranked domains against a set of URL path templates, optionally
//! fanning requests out to remote worker proxies, on an automated
//! incremental/full-rescan schedule with an operator-controlled pause gate.

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod automation;
mod config;
mod database;
mod date_range;
mod executor;
mod local_concurrency;
mod placeholder;
mod probe;
mod quota_scheduler;
mod scheduler;
mod strategy;
mod worker_client;
mod worker_pool;

#[cfg(test)]
mod tests;

use automation::AutomationController;
use config::BootstrapConfig;
use database::SqliteRepository;
use executor::TaskExecutor;
use quota_scheduler::QuotaScheduler;
use scheduler::AutomationScheduler;
use shared::repository::{DomainRepository, ResultRepository, SettingsRepository, TaskRepository, TemplateRepository, WorkerRepository};
use worker_pool::WorkerPool;

/// Command-line arguments for the scan engine.
#[derive(Parser, Debug)]
#[command(name = "scanner")]
#[command(about = "Domain scan engine: probes (domain, template) pairs over HTTP with worker failover", long_about = None)]
struct CliArgs {
    /// Path to the bootstrap config file.
    #[arg(value_name = "CONFIG_FILE", default_value = "scanner.toml")]
    config_path: PathBuf,

    /// Overrides the database path from the config file.
    #[arg(long = "db-path", value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Overrides the log level from the config file.
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Runs one task once, outside the scheduler, and exits.
    #[arg(long = "manual-scan", value_name = "TASK_ID")]
    manual_scan: Option<i64>,

    /// Creates the database schema (if absent) and exits.
    #[arg(long = "init-db")]
    init_db: bool,
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scanner={level},shared={level}")));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
}

struct Engine {
    repo: Arc<SqliteRepository>,
    automation: Arc<AutomationController>,
    worker_pool: Arc<WorkerPool>,
    executor: Arc<TaskExecutor>,
    automation_scheduler: AutomationScheduler,
    quota_scheduler: QuotaScheduler,
}

impl Engine {
    async fn bootstrap(config: &BootstrapConfig) -> Result<Self> {
        let repo = Arc::new(
            SqliteRepository::open(&config.database_path, config.database_busy_timeout_secs)
                .context("failed to open database")?,
        );
        repo.initialize().await.context("failed to initialize database schema")?;

        let settings: Arc<dyn SettingsRepository> = repo.clone();
        let domains: Arc<dyn DomainRepository> = repo.clone();
        let tasks: Arc<dyn TaskRepository> = repo.clone();
        let results: Arc<dyn ResultRepository> = repo.clone();
        let templates: Arc<dyn TemplateRepository> = repo.clone();
        let workers: Arc<dyn WorkerRepository> = repo.clone();

        let automation = Arc::new(AutomationController::load(settings.clone()).await.context("failed to load automation state")?);
        let worker_pool = Arc::new(WorkerPool::load(workers).await.context("failed to load worker pool")?);

        let http_client = reqwest::Client::builder()
            .user_agent(shared::defaults::default_user_agent())
            .build()
            .context("failed to build http client")?;

        let executor = Arc::new(TaskExecutor::new(
            domains,
            tasks.clone(),
            results,
            templates.clone(),
            settings.clone(),
            worker_pool.clone(),
            http_client,
        ));

        let bootstrap_settings = settings.load().await.context("failed to load settings for worker pool bootstrap")?;
        if bootstrap_settings.enable_worker_mode() {
            for url in bootstrap_settings.worker_urls() {
                if let Err(err) = worker_pool.add(&url).await {
                    warn!(url = %url, error = %err, "failed to add configured worker endpoint");
                }
            }
        }

        let automation_scheduler = AutomationScheduler::new(tasks, settings, templates, automation.clone(), executor.clone());
        let quota_scheduler = QuotaScheduler::new(worker_pool.clone());

        Ok(Self {
            repo,
            automation,
            worker_pool,
            executor,
            automation_scheduler,
            quota_scheduler,
        })
    }

    async fn start(&mut self) -> Result<()> {
        let tasks: Arc<dyn TaskRepository> = self.repo.clone();
        scheduler::resume_interrupted_tasks(&tasks, &self.executor, &self.automation)
            .await
            .context("failed to resume interrupted tasks")?;

        self.automation_scheduler.start().await.context("failed to start automation scheduler")?;
        self.quota_scheduler.start();
        info!(workers = self.worker_pool.len().await, "scan engine started");
        Ok(())
    }

    fn stop(&mut self) {
        self.automation_scheduler.stop();
        self.quota_scheduler.stop();
        info!("scan engine stopped");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let mut config = BootstrapConfig::load(&cli_args.config_path).await.context("failed to load bootstrap config")?;
    if let Some(db_path) = cli_args.db_path.clone() {
        config.database_path = db_path;
    }
    if let Some(log_level) = cli_args.log_level.clone() {
        config.log_level = log_level;
    }

    init_logging(&config.log_level);
    info!(config_path = %cli_args.config_path.display(), "domain scan engine starting up");

    if cli_args.init_db {
        let repo = SqliteRepository::open(&config.database_path, config.database_busy_timeout_secs)?;
        repo.initialize().await?;
        info!(db_path = %config.database_path.display(), "database schema initialized");
        return Ok(());
    }

    let mut engine = match Engine::bootstrap(&config).await {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "fatal error initializing scan engine");
            std::process::exit(1);
        }
    };

    if let Some(task_id) = cli_args.manual_scan {
        info!(task_id, "running manual scan");
        engine
            .executor
            .execute_scan(task_id, true, true, tokio_util::sync::CancellationToken::new())
            .await?;
        return Ok(());
    }

    engine.start().await?;

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
            info!("received Ctrl+C");
        }
    };

    shutdown_signal.await;
    engine.stop();
    info!("shutdown complete");
    Ok(())
}
