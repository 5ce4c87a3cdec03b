//! Streaming metrics configuration

use serde::{Deserialize, Serialize};

/// Bounds and caching for the streaming-performance tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum concurrently active streams; admission above this is rejected
    pub max_active_streams: usize,

    /// Completed-stream history capacity (oldest evicted past this)
    pub history_capacity: usize,

    /// TTL for cached aggregate metrics, in seconds
    pub metrics_cache_ttl_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_active_streams: 10_000,
            history_capacity: 1_000,
            metrics_cache_ttl_secs: 10,
        }
    }
}

impl StreamingConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.max_active_streams == 0 {
            return Err("max_active_streams must be >= 1".to_string());
        }

        if self.history_capacity == 0 {
            return Err("history_capacity must be >= 1".to_string());
        }

        Ok(())
    }
}
