//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. The typed settings consumed by services are derived from
//! this structure rather than read from it directly.

use crate::coordination::FlushPermit;
use crate::queue::domain::{BackoffPolicy, JobOptions};
use crate::queue::services::{ScannerSettings, SweepSettings, WorkerSettings};
use crate::task::domain::UpdatePolicy;
use crate::task::services::TaskCommandSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid configuration JSON.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Live deployment.
    Production,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskflowConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Per-task update lock lifetime in milliseconds.
    pub lock_ttl_ms: u64,
    /// Default cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Treatment of invalid patch fields.
    pub update_policy: UpdatePolicy,
    /// Options for jobs emitted by task mutations.
    pub jobs: JobsConfig,
    /// Queue consumer settings.
    pub worker: WorkerConfig,
    /// Overdue scanning settings.
    pub overdue: OverdueConfig,
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            lock_ttl_ms: 10_000,
            cache_ttl_secs: 300,
            update_policy: UpdatePolicy::default(),
            jobs: JobsConfig::default(),
            worker: WorkerConfig::default(),
            overdue: OverdueConfig::default(),
        }
    }
}

/// Retry options for task mutation jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Attempt ceiling.
    pub attempts: u32,
    /// Backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

impl JobsConfig {
    fn options(self) -> JobOptions {
        JobOptions::new(
            self.attempts,
            BackoffPolicy::exponential(Duration::from_millis(self.backoff_base_ms)),
        )
    }
}

/// Queue consumer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Handlers run concurrently by one worker.
    pub concurrency: usize,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 500,
        }
    }
}

/// Overdue scanning settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverdueConfig {
    /// Seconds between sweeps.
    pub period_secs: u64,
    /// Tasks fetched per sweep page.
    pub batch_size: u32,
    /// Attempt ceiling for sweep jobs.
    pub attempts: u32,
    /// Backoff base delay for sweep jobs in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for OverdueConfig {
    fn default() -> Self {
        Self {
            period_secs: 3_600,
            batch_size: 100,
            attempts: 3,
            backoff_base_ms: 5_000,
        }
    }
}

impl TaskflowConfig {
    /// Parses configuration from JSON, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed or a
    /// field has the wrong type.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Returns a permit for flushing the shared cache, outside production
    /// only.
    #[must_use]
    pub fn flush_permit(&self) -> Option<FlushPermit> {
        (self.environment != Environment::Production).then(FlushPermit::new)
    }

    /// Returns the default cache entry lifetime.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Returns settings for the task command service.
    #[must_use]
    pub fn command_settings(&self) -> TaskCommandSettings {
        TaskCommandSettings {
            lock_ttl: Duration::from_millis(self.lock_ttl_ms),
            update_policy: self.update_policy,
            job_options: self.jobs.options(),
        }
    }

    /// Returns settings for queue workers.
    #[must_use]
    pub const fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.worker.concurrency,
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
        }
    }

    /// Returns settings for the overdue sweep handler.
    ///
    /// Notifications use the same retry options as mutation jobs.
    #[must_use]
    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            batch_size: self.overdue.batch_size,
            notification_options: self.jobs.options(),
        }
    }

    /// Returns settings for the overdue scanner.
    #[must_use]
    pub fn scanner_settings(&self) -> ScannerSettings {
        ScannerSettings {
            period: Duration::from_secs(self.overdue.period_secs),
            job_options: JobOptions::new(
                self.overdue.attempts,
                BackoffPolicy::exponential(Duration::from_millis(self.overdue.backoff_base_ms)),
            ),
        }
    }
}
