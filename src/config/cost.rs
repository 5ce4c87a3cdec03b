//! Cost tracking configuration

use serde::{Deserialize, Serialize};

/// Bounds and alerting for the cost tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Usage ledger capacity (oldest records evicted past this)
    pub ledger_capacity: usize,

    /// Budget alert thresholds as percentages of the limit, ascending
    pub alert_thresholds_percent: Vec<u8>,

    /// Alert history capacity
    pub alert_history_capacity: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: 10_000,
            alert_thresholds_percent: vec![50, 80, 90, 100],
            alert_history_capacity: 100,
        }
    }
}

impl CostConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger_capacity == 0 {
            return Err("ledger_capacity must be >= 1".to_string());
        }

        if self.alert_thresholds_percent.is_empty() {
            return Err("alert_thresholds_percent must not be empty".to_string());
        }

        if !self
            .alert_thresholds_percent
            .windows(2)
            .all(|w| w[0] < w[1])
        {
            return Err("alert_thresholds_percent must be strictly ascending".to_string());
        }

        Ok(())
    }
}
