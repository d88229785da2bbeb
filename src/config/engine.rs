//! Queue, result retention, cache and pipeline settings

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Job queue and result store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of queued, unconsumed jobs
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long an unread result is kept, in seconds
    #[serde(default = "default_hour")]
    pub result_retention_secs: u64,

    /// Interval between result store sweeps, in seconds
    #[serde(default = "default_hour")]
    pub sweep_interval_secs: u64,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_hour() -> u64 {
    3600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            result_retention_secs: default_hour(),
            sweep_interval_secs: default_hour(),
        }
    }
}

impl EngineConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject settings the queue and sweeper cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(EngineError::Config("engine.queue_capacity must be at least 1".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(EngineError::Config("engine.sweep_interval_secs must be at least 1".into()));
        }
        Ok(())
    }
}

/// Model cache bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident models
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Fraction of total device memory that triggers eviction
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
}

fn default_max_entries() -> usize {
    3
}

fn default_memory_threshold() -> f64 {
    0.75
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            memory_threshold: default_memory_threshold(),
        }
    }
}

impl CacheConfig {
    /// Allocation threshold in bytes for a device of the given size
    pub fn threshold_bytes(&self, total_memory: u64) -> u64 {
        (total_memory as f64 * self.memory_threshold.clamp(0.0, 1.0)) as u64
    }
}

/// Inference pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total generation attempts before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts that produced only empty candidates
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Back-off after a device out-of-memory error
    #[serde(default = "default_oom_backoff_ms")]
    pub oom_backoff_ms: u64,

    /// Lower bound of the simulated greeting latency
    #[serde(default = "default_greeting_delay_min_ms")]
    pub greeting_delay_min_ms: u64,

    /// Upper bound (exclusive) of the simulated greeting latency
    #[serde(default = "default_greeting_delay_max_ms")]
    pub greeting_delay_max_ms: u64,

    /// Number of recent corpus rows used as examples
    #[serde(default = "default_corpus_sample_rows")]
    pub corpus_sample_rows: usize,

    /// Maximum number of sticker markers kept in a candidate
    #[serde(default = "default_max_stickers")]
    pub max_stickers: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_oom_backoff_ms() -> u64 {
    2000
}

fn default_greeting_delay_min_ms() -> u64 {
    3000
}

fn default_greeting_delay_max_ms() -> u64 {
    7000
}

fn default_corpus_sample_rows() -> usize {
    5
}

fn default_max_stickers() -> usize {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            oom_backoff_ms: default_oom_backoff_ms(),
            greeting_delay_min_ms: default_greeting_delay_min_ms(),
            greeting_delay_max_ms: default_greeting_delay_max_ms(),
            corpus_sample_rows: default_corpus_sample_rows(),
            max_stickers: default_max_stickers(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn oom_backoff(&self) -> Duration {
        Duration::from_millis(self.oom_backoff_ms)
    }

    /// Greeting latency window, never empty
    pub fn greeting_delay(&self) -> Range<Duration> {
        let min = Duration::from_millis(self.greeting_delay_min_ms);
        let max = Duration::from_millis(self.greeting_delay_max_ms.max(self.greeting_delay_min_ms + 1));
        min..max
    }
}
