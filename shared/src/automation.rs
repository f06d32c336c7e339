//! `AutomationState` and `SchedulerConfig` entities (§3 Data Model)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The global automation pause gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationState {
    pub enabled: bool,
    pub last_paused_at: Option<DateTime<Utc>>,
}

impl Default for AutomationState {
    fn default() -> Self {
        Self {
            enabled: true,
            last_paused_at: None,
        }
    }
}

/// Status snapshot returned by `AutomationController::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub enabled: bool,
    pub last_paused_at: Option<DateTime<Utc>>,
    /// `now - last_paused_at`, only populated while enabled and a pause
    /// timestamp exists (time elapsed since the automation was last resumed).
    pub uptime: Option<chrono::Duration>,
}

/// Incremental/full-rescan scheduling state (§4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub incremental_enabled: bool,
    pub rescan_enabled: bool,
    pub last_incremental_run: Option<DateTime<Utc>>,
    pub last_rescan_run: Option<DateTime<Utc>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            incremental_enabled: true,
            rescan_enabled: false,
            last_incremental_run: None,
            last_rescan_run: None,
        }
    }
}

/// Minimum spacing between runs, per §4.10 / §6.
pub const INCREMENTAL_PERIOD: chrono::Duration = chrono::Duration::hours(24);
pub const RESCAN_PERIOD: chrono::Duration = chrono::Duration::days(180);
