//! Shared data model, settings and error types for the domain scan engine.
//!
//! This crate has no I/O: it defines the entities of §3 (`Domain`,
//! `PathTemplate`, `ScanTask`/`ScanResult`, `WorkerEndpoint`,
//! `AutomationState`/`SchedulerConfig`), the typed settings accessor layer
//! of §6/§9, and the error taxonomy of §7. The `scanner` crate implements
//! the engine against these types.

pub mod automation;
pub mod config;
pub mod defaults;
pub mod domain;
pub mod error;
pub mod repository;
pub mod task;
pub mod template;
pub mod worker;

pub use automation::{AutomationState, AutomationStatus, SchedulerConfig};
pub use config::Settings;
pub use domain::Domain;
pub use error::{DisabledReason, ScanError};
pub use task::{ScanResult, ScanTask, TaskStatus, TaskTarget};
pub use template::PathTemplate;
pub use worker::WorkerEndpoint;

/// Result type alias used throughout the workspace for contextual errors.
pub type Result<T> = anyhow::Result<T>;
