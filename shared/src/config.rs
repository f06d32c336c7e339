//! Dynamic settings: a typed accessor layer over the `settings` key-value
//! table of §6, rather than a loose string map (Design Notes §9).
//!
//! `Settings` is a pure, synchronous, in-memory snapshot. Loading it from
//! storage and persisting individual keys back is the repository layer's
//! job (`scanner::repository`); this type only knows how to parse and
//! default the values it holds, so it can be unit tested without a
//! database.

use crate::defaults::*;
use std::collections::HashMap;

/// A typed snapshot of the `settings` table.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    raw: HashMap<String, String>,
}

impl Settings {
    pub fn from_map(raw: HashMap<String, String>) -> Self {
        Self { raw }
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    /// Sets a key in this in-memory snapshot. Does not persist; callers go
    /// through the repository to write through to storage.
    pub fn set_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.raw.insert(key.into(), value.into());
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.raw
            .get(key)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.raw
            .get(key)
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.raw
            .get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default)
    }

    fn string(&self, key: &str, default: impl Into<String>) -> String {
        self.raw
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.into())
    }

    fn json_strings(&self, key: &str) -> Vec<String> {
        self.raw
            .get(key)
            .and_then(|v| serde_json::from_str::<Vec<String>>(v).ok())
            .unwrap_or_default()
    }

    // --- automation ---

    pub fn automation_enabled(&self) -> bool {
        self.bool("automation_enabled", true)
    }

    pub fn automation_last_paused(&self) -> Option<String> {
        self.raw.get("automation_last_paused").cloned()
    }

    pub fn automation_incremental_enabled(&self) -> bool {
        self.bool(
            "automation_incremental_enabled",
            default_automation_incremental_enabled(),
        )
    }

    pub fn automation_rescan_enabled(&self) -> bool {
        self.bool(
            "automation_rescan_enabled",
            default_automation_rescan_enabled(),
        )
    }

    pub fn automation_last_incremental(&self) -> Option<String> {
        self.raw.get("automation_last_incremental").cloned()
    }

    pub fn automation_last_rescan(&self) -> Option<String> {
        self.raw.get("automation_last_rescan").cloned()
    }

    // --- worker pool ---

    pub fn enable_worker_mode(&self) -> bool {
        self.bool("enable_worker_mode", false)
    }

    pub fn worker_urls(&self) -> Vec<String> {
        self.json_strings("worker_urls")
    }

    pub fn worker_batch_size(&self) -> u32 {
        self.u32("worker_batch_size", default_worker_batch_size()).clamp(1, 10)
    }

    pub fn worker_timeout_ms(&self) -> u64 {
        self.u64("worker_timeout", default_worker_timeout_ms())
    }

    pub fn worker_daily_quota(&self) -> u64 {
        self.u64("worker_daily_quota", default_worker_daily_quota())
    }

    // --- scanning ---

    pub fn scan_concurrency(&self) -> u32 {
        self.u32("scan_concurrency", default_scan_concurrency())
            .clamp(1, 1000)
    }

    pub fn scan_timeout_ms(&self) -> u64 {
        self.u64("scan_timeout", default_request_timeout_secs() * 1000)
    }

    pub fn scan_batch_size(&self) -> u32 {
        self.u32("scan_batch_size", default_worker_batch_size())
    }

    pub fn csv_url(&self) -> Option<String> {
        self.raw.get("csv_url").cloned()
    }

    pub fn enable_protocol_fallback(&self) -> bool {
        self.bool("enable_protocol_fallback", false)
    }

    pub fn enable_subdomain_discovery(&self) -> bool {
        self.bool("enable_subdomain_discovery", false)
    }

    pub fn common_subdomains(&self) -> Vec<String> {
        self.json_strings("common_subdomains")
    }

    /// Legacy, comma-joined template list (superseded by the `path_templates`
    /// repository table, but still read as a fallback).
    pub fn legacy_path_templates(&self) -> Vec<String> {
        self.raw
            .get("path_templates")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn default_url_template(&self) -> String {
        self.string("default_url_template", default_url_template())
    }

    pub fn default_concurrency(&self) -> u32 {
        self.u32("default_concurrency", default_scan_concurrency())
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.u64("request_timeout", default_request_timeout_secs())
    }

    pub fn max_concurrency(&self) -> u32 {
        self.u32("max_concurrency", default_max_concurrency())
    }

    pub fn retry_count(&self) -> u32 {
        self.u32("retry_count", default_retry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_fall_back_to_documented_defaults() {
        let s = Settings::default();
        assert_eq!(s.max_concurrency(), 100);
        assert_eq!(s.request_timeout_secs(), 10);
        assert_eq!(s.retry_count(), 2);
        assert_eq!(s.worker_batch_size(), 10);
        assert_eq!(s.worker_timeout_ms(), 10_000);
        assert_eq!(s.worker_daily_quota(), 100_000);
        assert!(s.automation_incremental_enabled());
        assert!(!s.automation_rescan_enabled());
    }

    #[test]
    fn worker_batch_size_is_clamped_to_one_through_ten() {
        let mut raw = HashMap::new();
        raw.insert("worker_batch_size".to_string(), "999".to_string());
        let s = Settings::from_map(raw);
        assert_eq!(s.worker_batch_size(), 10);
    }

    #[test]
    fn worker_urls_parses_json_array() {
        let mut raw = HashMap::new();
        raw.insert(
            "worker_urls".to_string(),
            r#"["https://w1.example","https://w2.example"]"#.to_string(),
        );
        let s = Settings::from_map(raw);
        assert_eq!(
            s.worker_urls(),
            vec!["https://w1.example".to_string(), "https://w2.example".to_string()]
        );
    }

    #[test]
    fn set_raw_is_visible_to_typed_getters() {
        let mut s = Settings::default();
        s.set_raw("automation_enabled", "false");
        assert!(!s.automation_enabled());
    }
}
