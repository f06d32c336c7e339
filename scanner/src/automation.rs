//! Automation Controller (§4.9, component C9)
//!
//! A process-wide boolean gate, default enabled, persisted through the
//! settings store so a restart doesn't silently resume an operator-paused
//! engine. Mirrors the teacher's habit of keeping small pieces of global
//! runtime state behind a single `RwLock`-guarded struct rather than a
//! sprinkling of atomics.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::automation::AutomationStatus;
use shared::repository::SettingsRepository;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

const KEY_ENABLED: &str = "automation_enabled";
const KEY_LAST_PAUSED: &str = "automation_last_paused";

struct State {
    enabled: bool,
    last_paused_at: Option<DateTime<Utc>>,
}

pub struct AutomationController {
    state: RwLock<State>,
    settings: Arc<dyn SettingsRepository>,
}

impl AutomationController {
    /// Loads the current gate state from storage.
    pub async fn load(settings: Arc<dyn SettingsRepository>) -> Result<Self> {
        let loaded = settings.load().await?;
        let enabled = loaded.automation_enabled();
        let last_paused_at = loaded
            .automation_last_paused()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        Ok(Self {
            state: RwLock::new(State { enabled, last_paused_at }),
            settings,
        })
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// Alias used by the scheduler's gating checks (§4.9 `shouldRun`).
    pub async fn should_run(&self) -> bool {
        self.is_enabled().await
    }

    pub async fn enable(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.enabled = true;
        self.settings.set(KEY_ENABLED, "true").await?;
        info!("automation enabled");
        Ok(())
    }

    /// Disables the gate and records `lastPausedAt = now`.
    pub async fn disable(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.enabled = false;
        let now = Utc::now();
        state.last_paused_at = Some(now);
        self.settings.set(KEY_ENABLED, "false").await?;
        self.settings.set(KEY_LAST_PAUSED, &now.to_rfc3339()).await?;
        info!("automation disabled");
        Ok(())
    }

    /// Flips the gate and returns the *new* value (P11: `toggle` returns
    /// `!previous`).
    pub async fn toggle(&self) -> Result<bool> {
        let was_enabled = self.is_enabled().await;
        if was_enabled {
            self.disable().await?;
        } else {
            self.enable().await?;
        }
        Ok(!was_enabled)
    }

    pub async fn get_status(&self) -> AutomationStatus {
        let state = self.state.read().await;
        let uptime = if state.enabled {
            state.last_paused_at.map(|paused| Utc::now() - paused)
        } else {
            None
        };
        AutomationStatus {
            enabled: state.enabled,
            last_paused_at: state.last_paused_at,
            uptime,
        }
    }
}
