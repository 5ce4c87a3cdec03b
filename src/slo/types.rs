//! Error tracking data types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// One observed error occurrence, retained in the bounded recent-history
/// ring. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub error_type: String,
    pub message: String,
    /// Model involved, when known
    pub model: Option<String>,
    /// HTTP status returned to the client
    pub status_code: u16,
    /// Stable hash of (error_type, endpoint, normalized message)
    pub fingerprint: String,
}

/// Aggregated state for one class of structurally similar errors.
///
/// Created on the first occurrence of a fingerprint and updated on each
/// repeat; never deleted within process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    pub fingerprint: String,
    pub error_type: String,
    pub endpoint: String,
    /// Message with variable parts substituted away
    pub normalized_message: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Models observed with this pattern, sorted for stable output
    pub affected_models: BTreeSet<String>,
}

/// SLO state derived on demand from the rolling outcome window.
#[derive(Debug, Clone, Serialize)]
pub struct SloStatus {
    /// Configured target success rate (e.g., 0.999)
    pub target_success_rate: f64,
    /// Observed success rate over the window; 1.0 when no requests observed
    pub current_success_rate: f64,
    /// Requests observed in the window
    pub window_requests: u64,
    /// floor((1 - target) * window_requests)
    pub error_budget_total: u64,
    /// Errors observed in the window
    pub error_budget_consumed: u64,
    /// total - consumed; negative once the budget is blown
    pub error_budget_remaining: i64,
    /// consumed > total
    pub slo_violated: bool,
    /// (error rate) / (1 - target); 1.0 means budget burns at exactly the
    /// sustainable rate
    pub burn_rate: f64,
}

/// Snapshot of error-tracking aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMetricsSnapshot {
    /// Lifetime error count
    pub total_errors: u64,
    /// Lifetime counts by error class
    pub errors_by_type: HashMap<String, u64>,
    /// Lifetime counts by endpoint
    pub errors_by_endpoint: HashMap<String, u64>,
    /// Most recent errors, oldest first (bounded ring contents)
    pub recent_errors: Vec<ErrorRecord>,
    /// Distinct fingerprints observed
    pub pattern_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slo_status_serialization() {
        let status = SloStatus {
            target_success_rate: 0.999,
            current_success_rate: 0.998,
            window_requests: 1000,
            error_budget_total: 1,
            error_budget_consumed: 2,
            error_budget_remaining: -1,
            slo_violated: true,
            burn_rate: 2.0,
        };

        let json = serde_json::to_string(&status).expect("Failed to serialize");
        assert!(json.contains("\"slo_violated\":true"));
        assert!(json.contains("\"error_budget_remaining\":-1"));
        assert!(json.contains("\"burn_rate\":2.0"));
    }

    #[test]
    fn test_pattern_models_are_sorted() {
        let mut pattern = ErrorPattern {
            fingerprint: "a1b2c3d4".to_string(),
            error_type: "NotFound".to_string(),
            endpoint: "/v1/models".to_string(),
            normalized_message: "model <NUM> is unknown".to_string(),
            count: 2,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            affected_models: BTreeSet::new(),
        };
        pattern.affected_models.insert("zephyr".to_string());
        pattern.affected_models.insert("llama3:8b".to_string());

        let models: Vec<&String> = pattern.affected_models.iter().collect();
        assert_eq!(models, vec!["llama3:8b", "zephyr"]);
    }
}
