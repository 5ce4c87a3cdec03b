//! Error tracking and SLO configuration

use serde::{Deserialize, Serialize};

/// Bounds and targets for the error metrics tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    /// Target success rate over the window (e.g., 0.999 = three nines)
    pub target_success_rate: f64,

    /// Rolling SLO window in seconds
    pub window_secs: u64,

    /// Recent-error ring buffer capacity
    pub recent_errors_capacity: usize,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            target_success_rate: 0.999,
            window_secs: 3_600,
            recent_errors_capacity: 500,
        }
    }
}

impl SloConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.target_success_rate) {
            return Err("target_success_rate must be in [0.0, 1.0)".to_string());
        }

        if self.window_secs == 0 {
            return Err("window_secs must be >= 1".to_string());
        }

        if self.recent_errors_capacity == 0 {
            return Err("recent_errors_capacity must be >= 1".to_string());
        }

        Ok(())
    }
}
