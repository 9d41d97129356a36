//! Pipeline tuning contracts that can be shared across crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pipeline runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Attempts for one {resolve → open → start} unit
    pub start_attempts: u32,

    /// Device hub wait bound used during resolution (milliseconds)
    pub device_timeout_ms: u64,

    /// Consumer queue configuration
    pub queue: QueueConfig,

    /// Synchronizer configuration
    pub sync: SyncConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            start_attempts: 3,
            device_timeout_ms: 5000,
            queue: QueueConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl PipelineSettings {
    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }
}

/// Consumer queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum buffered frame sets
    pub capacity: usize,
    /// What to discard when full
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Queue overflow policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued item to make room (protects producer latency)
    #[default]
    DropOldest,
    /// Discard the incoming item
    DropNewest,
}

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed matching window in milliseconds.
    ///
    /// `None` derives the window from the enabled streams' frame rates.
    pub window_ms: Option<f64>,
    /// Upper bound for the derived window (milliseconds)
    pub max_window_ms: f64,
    /// Buffered frames per stream
    pub buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_ms: None,
            max_window_ms: 50.0,
            buffer_size: 16,
        }
    }
}
