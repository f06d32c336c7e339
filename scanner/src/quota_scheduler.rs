//! Quota Scheduler (§4.11, component C11)
//!
//! The simplest of the three scheduling loops: fire once on start, then
//! hourly. The pool's own per-endpoint `quotaResetAt` check makes repeated
//! calls a no-op between midnights, so there is no single-flight guard here
//! the way the automation scheduler needs one.

use crate::worker_pool::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TICK_PERIOD: Duration = Duration::from_secs(60 * 60);

pub struct QuotaScheduler {
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl QuotaScheduler {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Idempotent: calling `start` while already running cancels the
    /// previous loop and installs a fresh one.
    pub fn start(&mut self) {
        self.stop();
        self.cancel = CancellationToken::new();
        let pool = self.pool.clone();
        let cancel = self.cancel.clone();
        info!("quota scheduler starting");

        self.handle = Some(tokio::spawn(async move {
            run_loop(pool, cancel).await;
        }));
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_loop(pool: Arc<WorkerPool>, cancel: CancellationToken) {
    tick(&pool).await;

    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.tick().await; // consume the immediate first tick, already handled above

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("quota scheduler stopped");
                break;
            }
            _ = interval.tick() => {
                tick(&pool).await;
            }
        }
    }
}

async fn tick(pool: &WorkerPool) {
    if let Err(err) = pool.reset_daily_quotas().await {
        error!(error = %err, "quota reset tick failed");
    }
}
