//! Pipeline, worker pool, and scheduler configuration structures.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. `0` means one per logical CPU.
    pub worker_count: usize,
    /// Maximum queued jobs before submissions are rejected.
    pub max_queue_depth: usize,
    /// Bound on how long shutdown waits for each worker.
    pub shutdown_timeout_ms: u64,
    /// Stack size for worker threads, in bytes.
    pub thread_stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 16,
            max_queue_depth: 10_000,
            shutdown_timeout_ms: 10_000,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl WorkerPoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the maximum queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Set the per-worker shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout_ms(mut self, shutdown_timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = shutdown_timeout_ms;
        self
    }

    /// Worker count with `0` resolved to the number of logical CPUs.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }

    /// Shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Deferred scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name given to the background thread.
    pub thread_name: String,
    /// Bound on how long shutdown waits for the loop to exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "deferred-scheduler".into(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    /// Shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate scheduler configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_name.trim().is_empty() {
            return Err("thread_name must not be empty".into());
        }
        if self.shutdown_timeout_ms == 0 {
            return Err("shutdown_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// One pipeline stage: its worker pool and how long it defers its outcome event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Pool that runs the stage's handlers.
    #[serde(default)]
    pub workers: WorkerPoolConfig,
    /// Delay, in seconds, before the stage publishes its outcome.
    pub delay_secs: f64,
}

impl ServiceConfig {
    /// Stage with the default pool and the given delay.
    #[must_use]
    pub fn with_delay_secs(delay_secs: f64) -> Self {
        Self {
            workers: WorkerPoolConfig::default(),
            delay_secs,
        }
    }

    /// Outcome delay as a `Duration`.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs).unwrap_or(Duration::ZERO)
    }

    /// Validate stage configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err("delay_secs must be a non-negative number".into());
        }
        self.workers.validate()
    }
}

/// Root configuration for an assembled order pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inventory stage.
    pub inventory: ServiceConfig,
    /// Payment stage.
    pub payment: ServiceConfig,
    /// Shared deferred scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Initial stock per resource key.
    #[serde(default = "default_stock")]
    pub stock: BTreeMap<String, u64>,
}

fn default_stock() -> BTreeMap<String, u64> {
    ["item_001", "item_002", "item_003", "item_004"]
        .into_iter()
        .map(|key| (key.to_string(), 9_999_999))
        .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inventory: ServiceConfig::with_delay_secs(1.0),
            payment: ServiceConfig::with_delay_secs(2.0),
            scheduler: SchedulerConfig::default(),
            stock: default_stock(),
        }
    }
}

impl PipelineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.inventory
            .validate()
            .map_err(|e| format!("inventory invalid: {e}"))?;
        self.payment
            .validate()
            .map_err(|e| format!("payment invalid: {e}"))?;
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        Ok(())
    }

    /// Parse pipeline configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by environment variables (a `.env` file is loaded
    /// first when present):
    ///
    /// | variable | field |
    /// |---|---|
    /// | `INVENTORY_WORKERS` | `inventory.workers.worker_count` |
    /// | `INVENTORY_DELAY_SEC` | `inventory.delay_secs` |
    /// | `PAYMENT_WORKERS` | `payment.workers.worker_count` |
    /// | `PAYMENT_DELAY_SEC` | `payment.delay_secs` |
    /// | `SCHEDULER_SHUTDOWN_TIMEOUT_MS` | `scheduler.shutdown_timeout_ms` |
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        override_with(&lookup, "INVENTORY_WORKERS", &mut cfg.inventory.workers.worker_count)?;
        override_with(&lookup, "INVENTORY_DELAY_SEC", &mut cfg.inventory.delay_secs)?;
        override_with(&lookup, "PAYMENT_WORKERS", &mut cfg.payment.workers.worker_count)?;
        override_with(&lookup, "PAYMENT_DELAY_SEC", &mut cfg.payment.delay_secs)?;
        override_with(
            &lookup,
            "SCHEDULER_SHUTDOWN_TIMEOUT_MS",
            &mut cfg.scheduler.shutdown_timeout_ms,
        )?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_with<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| format!("{name}={raw:?}: {e}"))?;
    }
    Ok(())
}
