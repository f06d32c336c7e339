//! Bootstrap configuration (`scanner.toml`), loaded once at process start.
//!
//! Everything that can change at runtime lives in the `settings` table
//! instead (`shared::config::Settings`, read through the repository layer);
//! this file only covers what's needed before a database connection even
//! exists — where the database lives, how verbose to log, and the process
//! lifecycle knobs.

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::defaults::{default_database_busy_timeout_secs, default_domain_batch_size, default_graceful_shutdown_timeout_secs};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Path to the SQLite database file, relative paths resolved against
    /// the current working directory at process start.
    pub database_path: PathBuf,
    pub log_level: String,
    pub database_busy_timeout_secs: u64,
    pub graceful_shutdown_timeout_secs: u64,
    /// Override for `DOMAIN_BATCH_SIZE` (§4.8); present so an operator can
    /// tune pagination without a rebuild.
    pub domain_batch_size: i64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("scanner.db"),
            log_level: "info".to_string(),
            database_busy_timeout_secs: default_database_busy_timeout_secs(),
            graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout_secs(),
            domain_batch_size: default_domain_batch_size(),
        }
    }
}

impl BootstrapConfig {
    /// Loads `path`, falling back to all-defaults if the file doesn't
    /// exist (so a first run with no `scanner.toml` still boots).
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: BootstrapConfig =
            toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.domain_batch_size <= 0 {
            anyhow::bail!("domain_batch_size must be positive, got {}", self.domain_batch_size);
        }
        if self.database_busy_timeout_secs == 0 {
            anyhow::bail!("database_busy_timeout_secs must be positive");
        }
        Ok(())
    }
}
