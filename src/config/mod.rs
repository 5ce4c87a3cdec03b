//! Configuration module for the FakeAI metrics pipeline
//!
//! Provides typed configuration loading from TOML files with defaults.
//!
//! # Example
//!
//! ```rust
//! use fakeai::config::FakeAiConfig;
//!
//! // Load defaults
//! let config = FakeAiConfig::default();
//! assert_eq!(config.bus.workers, 4);
//!
//! // Parse from TOML
//! let toml = r#"
//! [bus]
//! workers = 8
//! "#;
//! let config: FakeAiConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.bus.workers, 8);
//! ```

pub mod bus;
pub mod cost;
pub mod error;
pub mod logging;
pub mod slo;
pub mod streaming;

pub use bus::BusConfig;
pub use cost::CostConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use slo::SloConfig;
pub use streaming::StreamingConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the metrics pipeline.
///
/// Aggregates the event bus, tracker, and logging sections. Every section has
/// sensible defaults; an empty TOML file yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FakeAiConfig {
    /// Event bus dispatch and circuit breaker settings
    pub bus: BusConfig,
    /// Streaming metrics bounds
    pub streaming: StreamingConfig,
    /// Error tracking / SLO settings
    pub slo: SloConfig,
    /// Cost tracking and budget alerting settings
    pub cost: CostConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl FakeAiConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections, mapping the first failure to its field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus.validate().map_err(|m| ConfigError::Validation {
            field: "bus".to_string(),
            message: m,
        })?;
        self.streaming
            .validate()
            .map_err(|m| ConfigError::Validation {
                field: "streaming".to_string(),
                message: m,
            })?;
        self.slo.validate().map_err(|m| ConfigError::Validation {
            field: "slo".to_string(),
            message: m,
        })?;
        self.cost.validate().map_err(|m| ConfigError::Validation {
            field: "cost".to_string(),
            message: m,
        })?;
        Ok(())
    }
}
