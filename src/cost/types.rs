//! Cost tracking data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// One charge in the usage ledger. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    /// Stored cost, rounded half-up to six decimal places
    pub cost: Decimal,
}

/// Filters for [`CostTracker::get_usage`](crate::cost::CostTracker::get_usage).
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Only records within this many seconds of now
    pub window_seconds: Option<u64>,
}

impl UsageFilter {
    pub fn for_api_key(api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Default::default()
        }
    }
}

/// Per-model usage rollup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelUsage {
    pub request_count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cost: Decimal,
}

/// Aggregate usage over the filtered ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub request_count: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub total_cost: Decimal,
    pub by_model: HashMap<String, ModelUsage>,
}

/// Category of an optimization suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// High uncached prompt volume on a model with a cache discount
    EnablePromptCaching,
    /// Premium-model spend that could move to a cheaper model or the batch
    /// endpoint
    UseBatchProcessing,
}

/// Advisory cost-optimization hint derived from the usage ledger.
///
/// Suggestions are structured hints for operators, never automated actions.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub api_key: String,
    pub kind: SuggestionKind,
    pub model: String,
    /// Rough monthly-equivalent savings if the hint is adopted
    pub estimated_savings: Decimal,
    pub detail: String,
}
