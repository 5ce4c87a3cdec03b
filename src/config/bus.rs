//! Event bus configuration

use serde::{Deserialize, Serialize};

/// Dispatch pool and circuit breaker settings for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of dispatch workers (shards). Events sharing a correlation id
    /// always land on the same worker.
    pub workers: usize,

    /// Total queued-event capacity, split evenly across workers
    pub queue_capacity: usize,

    /// Subscriber failures within the window that open its circuit
    pub circuit_failure_threshold: u32,

    /// Sliding failure window in seconds
    pub circuit_failure_window_secs: u64,

    /// Cooldown before an open circuit allows a probe dispatch, in seconds
    pub circuit_cooldown_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 10_000,
            circuit_failure_threshold: 5,
            circuit_failure_window_secs: 60,
            circuit_cooldown_secs: 30,
        }
    }
}

impl BusConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be >= 1".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be >= 1".to_string());
        }

        if self.circuit_failure_threshold == 0 {
            return Err("circuit_failure_threshold must be >= 1".to_string());
        }

        Ok(())
    }
}
