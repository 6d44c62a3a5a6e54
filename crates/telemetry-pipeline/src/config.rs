// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Processor construction parameters, environment overrides, and validation.
//!
//! Defaults match the reference pipeline: a 1 second schedule delay (5 for
//! metrics, which tolerate more staleness), a 2048-record queue, 512-record
//! export batches, and a 30 second per-export timeout budget.
//!
//! Every parameter can be overridden through an environment variable; the
//! override applies on top of whichever defaults the caller started from.
//! Invalid combinations (a batch larger than the queue, zero sizes) are
//! construction errors, never runtime surprises.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Max idle time before an automatic flush attempt, in milliseconds.
pub const DEFAULT_SCHEDULE_DELAY_MS: u64 = 1_000;

/// Metrics tolerate more staleness than traces and logs.
pub const METRICS_SCHEDULE_DELAY_MS: u64 = 5_000;

/// Hard cap on buffered records per processor.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;

/// Records handed to the exporter per export call.
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;

/// Timeout budget for one export call, covering all of its retries.
pub const DEFAULT_EXPORT_TIMEOUT_MS: u64 = 30_000;

const ENV_SCHEDULE_DELAY_MS: &str = "TELEMETRY_SCHEDULE_DELAY_MS";
const ENV_MAX_QUEUE_SIZE: &str = "TELEMETRY_MAX_QUEUE_SIZE";
const ENV_MAX_EXPORT_BATCH_SIZE: &str = "TELEMETRY_MAX_EXPORT_BATCH_SIZE";
const ENV_EXPORT_TIMEOUT_MS: &str = "TELEMETRY_EXPORT_TIMEOUT_MS";
const ENV_START_WORKER_ON_BOOT: &str = "TELEMETRY_START_WORKER_ON_BOOT";

/// Invalid processor configuration, raised at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_export_batch_size ({batch}) must not exceed max_queue_size ({queue})")]
    BatchExceedsQueue { batch: usize, queue: usize },

    #[error("{field} must be greater than zero")]
    ZeroSize { field: &'static str },
}

/// Construction parameters for a batch processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Max idle time before the worker flushes whatever is buffered.
    pub schedule_delay: Duration,
    /// Hard cap on buffered records; overflow evicts the oldest.
    pub max_queue_size: usize,
    /// Upper bound on records per export call.
    pub max_export_batch_size: usize,
    /// Timeout budget handed to the exporter per export call.
    pub exporter_timeout: Duration,
    /// Start the background worker at construction. Disable for
    /// environments that fork before first use and start the worker
    /// explicitly from the process that emits.
    pub start_worker_on_boot: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            schedule_delay: Duration::from_millis(DEFAULT_SCHEDULE_DELAY_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            exporter_timeout: Duration::from_millis(DEFAULT_EXPORT_TIMEOUT_MS),
            start_worker_on_boot: true,
        }
    }
}

impl BatchConfig {
    /// Defaults for a metrics processor (longer schedule delay).
    #[must_use]
    pub fn metrics() -> Self {
        BatchConfig {
            schedule_delay: Duration::from_millis(METRICS_SCHEDULE_DELAY_MS),
            ..BatchConfig::default()
        }
    }

    /// Applies `TELEMETRY_*` environment overrides on top of `self`.
    ///
    /// Unparsable values are ignored in favor of the existing setting, in
    /// keeping with the rest of the configuration surface: a bad override
    /// should degrade to defaults, not take the process down.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if let Some(ms) = read_env_u64(ENV_SCHEDULE_DELAY_MS) {
            self.schedule_delay = Duration::from_millis(ms);
        }
        if let Some(size) = read_env_usize(ENV_MAX_QUEUE_SIZE) {
            self.max_queue_size = size;
        }
        if let Some(size) = read_env_usize(ENV_MAX_EXPORT_BATCH_SIZE) {
            self.max_export_batch_size = size;
        }
        if let Some(ms) = read_env_u64(ENV_EXPORT_TIMEOUT_MS) {
            self.exporter_timeout = Duration::from_millis(ms);
        }
        if let Ok(value) = env::var(ENV_START_WORKER_ON_BOOT) {
            self.start_worker_on_boot = value.to_lowercase() != "false";
        }
        self
    }

    /// Fails fast on configurations that could not behave correctly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroSize {
                field: "max_queue_size",
            });
        }
        if self.max_export_batch_size == 0 {
            return Err(ConfigError::ZeroSize {
                field: "max_export_batch_size",
            });
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(ConfigError::BatchExceedsQueue {
                batch: self.max_export_batch_size,
                queue: self.max_queue_size,
            });
        }
        Ok(())
    }
}

fn read_env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn read_env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
