//! # Cost Tracker
//!
//! Maintains a bounded usage ledger, per-key budgets with period rollover and
//! once-per-period threshold alerts, and advisory cost-optimization
//! heuristics.
//!
//! Budget overruns are not errors: they are first-class observable state
//! (`over_budget`, the alert history) that callers poll. Enforcement of hard
//! limits happens outside this tracker.

pub mod budget;
pub mod pricing;
pub mod types;

pub use budget::{Budget, BudgetAlert, BudgetLimitType, BudgetPeriod};
pub use pricing::{ModelPricing, PricingTable, COST_SCALE};
pub use types::{ModelUsage, Suggestion, SuggestionKind, UsageFilter, UsageRecord, UsageSummary};

use crate::config::CostConfig;
use crate::prom::{self, LabelSanitizer};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

struct CostState {
    ledger: VecDeque<UsageRecord>,
    budgets: HashMap<String, Budget>,
    alerts: VecDeque<BudgetAlert>,
    total_cost: Decimal,
    total_requests: u64,
    unknown_model_requests: u64,
}

/// Tracks usage, budgets, and optimization hints for simulated API spend.
pub struct CostTracker {
    state: Mutex<CostState>,
    pricing: PricingTable,
    sanitizer: LabelSanitizer,
    ledger_capacity: usize,
    alert_thresholds: Vec<u8>,
    alert_history_capacity: usize,
}

impl CostTracker {
    pub fn new(config: &CostConfig) -> Self {
        Self::with_pricing(config, PricingTable::new())
    }

    /// Construct with a custom pricing table (tests, alternate catalogs).
    pub fn with_pricing(config: &CostConfig, pricing: PricingTable) -> Self {
        Self {
            state: Mutex::new(CostState {
                ledger: VecDeque::with_capacity(config.ledger_capacity),
                budgets: HashMap::new(),
                alerts: VecDeque::new(),
                total_cost: Decimal::ZERO,
                total_requests: 0,
                unknown_model_requests: 0,
            }),
            pricing,
            sanitizer: LabelSanitizer::new(),
            ledger_capacity: config.ledger_capacity,
            alert_thresholds: config.alert_thresholds_percent.clone(),
            alert_history_capacity: config.alert_history_capacity,
        }
    }

    /// Record one completed request's usage and return its cost.
    ///
    /// Unknown models are ledgered at zero cost with a warning rather than
    /// rejected: the tokens still happened, only the rate is missing.
    pub fn record_usage(
        &self,
        api_key: &str,
        model: &str,
        endpoint: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        cached_tokens: u64,
        at: DateTime<Utc>,
    ) -> Decimal {
        let cost = match self
            .pricing
            .calculate_cost(model, prompt_tokens, completion_tokens, cached_tokens)
        {
            Some(cost) => cost,
            None => {
                tracing::warn!(model, "No pricing for model; recording zero-cost usage");
                Decimal::ZERO
            }
        };

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if !self.pricing.has_pricing(model) {
            state.unknown_model_requests += 1;
        }

        if state.ledger.len() >= self.ledger_capacity {
            state.ledger.pop_front();
        }
        state.ledger.push_back(UsageRecord {
            timestamp: at,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            prompt_tokens,
            completion_tokens,
            cached_tokens,
            cost,
        });
        state.total_cost += cost;
        state.total_requests += 1;
        metrics::gauge!("fakeai_cost_total_usd")
            .set(state.total_cost.to_f64().unwrap_or(0.0));

        if let Some(budget) = state.budgets.get_mut(api_key) {
            budget.roll_period(at);
            budget.used += cost;

            if budget.limit > Decimal::ZERO {
                let hundred = Decimal::from(100u32);
                for &threshold in &self.alert_thresholds {
                    let already_fired = budget.alerted_thresholds.contains(&threshold);
                    let crossed = budget.used * hundred >= budget.limit * Decimal::from(threshold);
                    if crossed && !already_fired {
                        budget.alerted_thresholds.push(threshold);
                        let alert = BudgetAlert {
                            id: Uuid::new_v4(),
                            api_key: api_key.to_string(),
                            threshold_percent: threshold,
                            used: budget.used,
                            limit: budget.limit,
                            at,
                        };
                        tracing::warn!(
                            api_key,
                            threshold_percent = threshold,
                            used = %alert.used,
                            limit = %alert.limit,
                            "Budget alert threshold crossed"
                        );
                        metrics::counter!("fakeai_budget_alerts_total").increment(1);
                        if state.alerts.len() >= self.alert_history_capacity {
                            state.alerts.pop_front();
                        }
                        state.alerts.push_back(alert);
                    }
                }
            }
        }

        cost
    }

    /// Configure (or replace) the budget for an API key.
    pub fn set_budget(
        &self,
        api_key: &str,
        limit: Decimal,
        period: BudgetPeriod,
        limit_type: BudgetLimitType,
    ) {
        let mut state = self.state.lock().unwrap();
        state.budgets.insert(
            api_key.to_string(),
            Budget::new(limit, period, limit_type, Utc::now()),
        );
        tracing::info!(api_key, limit = %limit, ?period, ?limit_type, "Budget configured");
    }

    /// Whether the key's spend exceeds its limit in the current period.
    ///
    /// Reported for soft budgets too; for hard budgets callers are expected
    /// to check this before admitting further usage. Keys without a budget
    /// are never over.
    pub fn over_budget(&self, api_key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.budgets.get_mut(api_key) {
            Some(budget) => {
                budget.roll_period(Utc::now());
                budget.is_over()
            }
            None => false,
        }
    }

    /// Current budget state for a key, after rollover.
    pub fn get_budget(&self, api_key: &str) -> Option<Budget> {
        let mut state = self.state.lock().unwrap();
        let budget = state.budgets.get_mut(api_key)?;
        budget.roll_period(Utc::now());
        Some(budget.clone())
    }

    /// Aggregate usage over the retained ledger, optionally filtered.
    pub fn get_usage(&self, filter: &UsageFilter) -> UsageSummary {
        let records: Vec<UsageRecord> = {
            let state = self.state.lock().unwrap();
            let cutoff = filter
                .window_seconds
                .map(|secs| Utc::now() - ChronoDuration::seconds(secs as i64));
            state
                .ledger
                .iter()
                .filter(|r| filter.api_key.as_deref().is_none_or(|k| r.api_key == k))
                .filter(|r| filter.model.as_deref().is_none_or(|m| r.model == m))
                .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
                .cloned()
                .collect()
        };

        let mut summary = UsageSummary::default();
        for record in records {
            summary.request_count += 1;
            summary.prompt_tokens += record.prompt_tokens;
            summary.completion_tokens += record.completion_tokens;
            summary.cached_tokens += record.cached_tokens;
            summary.total_cost += record.cost;

            let per_model = summary.by_model.entry(record.model).or_default();
            per_model.request_count += 1;
            per_model.prompt_tokens += record.prompt_tokens;
            per_model.completion_tokens += record.completion_tokens;
            per_model.cached_tokens += record.cached_tokens;
            per_model.cost += record.cost;
        }
        summary
    }

    /// Budget alerts, oldest first (bounded history).
    pub fn recent_alerts(&self) -> Vec<BudgetAlert> {
        self.state.lock().unwrap().alerts.iter().cloned().collect()
    }

    /// Derive advisory optimization hints from the retained ledger.
    pub fn get_optimization_suggestions(&self, api_key: Option<&str>) -> Vec<Suggestion> {
        const CACHING_MIN_PROMPT_TOKENS: u64 = 100_000;
        const BATCH_MIN_REQUESTS: u64 = 10;

        let mut grouped: HashMap<(String, String), ModelUsage> = HashMap::new();
        let mut key_totals: HashMap<String, Decimal> = HashMap::new();
        {
            let state = self.state.lock().unwrap();
            for record in &state.ledger {
                if api_key.is_some_and(|k| k != record.api_key) {
                    continue;
                }
                let entry = grouped
                    .entry((record.api_key.clone(), record.model.clone()))
                    .or_default();
                entry.request_count += 1;
                entry.prompt_tokens += record.prompt_tokens;
                entry.cached_tokens += record.cached_tokens;
                entry.cost += record.cost;
                *key_totals.entry(record.api_key.clone()).or_default() += record.cost;
            }
        }

        let premium_rate = Decimal::new(200, 2); // $2.00 per million input tokens
        let mut suggestions = Vec::new();

        for ((key, model), usage) in &grouped {
            let Some(pricing) = self.pricing.get_pricing(model) else {
                continue;
            };

            // Heavy uncached prompt volume on a cache-discounted model
            if let Some(cached_rate) = pricing.cached_input_per_million {
                let cached_ratio = if usage.prompt_tokens == 0 {
                    Decimal::ONE
                } else {
                    Decimal::from(usage.cached_tokens) / Decimal::from(usage.prompt_tokens)
                };
                if usage.prompt_tokens >= CACHING_MIN_PROMPT_TOKENS
                    && cached_ratio < Decimal::new(1, 1)
                {
                    let uncached = usage.prompt_tokens - usage.cached_tokens;
                    // Assume roughly half the uncached prompt volume is
                    // repeated context and therefore cacheable.
                    let savings = Decimal::from(uncached / 2)
                        * (pricing.input_per_million - cached_rate)
                        / Decimal::from(1_000_000u64);
                    suggestions.push(Suggestion {
                        api_key: key.clone(),
                        kind: SuggestionKind::EnablePromptCaching,
                        model: model.clone(),
                        estimated_savings: savings
                            .round_dp_with_strategy(
                                COST_SCALE,
                                rust_decimal::RoundingStrategy::MidpointAwayFromZero,
                            ),
                        detail: format!(
                            "{} of {} prompt tokens on {} were served uncached; \
                             enabling prompt caching would bill repeats at the cached rate",
                            uncached, usage.prompt_tokens, model
                        ),
                    });
                }
            }

            // Premium model dominating a key's spend
            let key_total = key_totals.get(key).copied().unwrap_or_default();
            if pricing.input_per_million >= premium_rate
                && usage.request_count >= BATCH_MIN_REQUESTS
                && key_total > Decimal::ZERO
                && usage.cost * Decimal::from(100u32) >= key_total * Decimal::from(80u32)
            {
                let savings = usage.cost * pricing::batch_discount();
                suggestions.push(Suggestion {
                    api_key: key.clone(),
                    kind: SuggestionKind::UseBatchProcessing,
                    model: model.clone(),
                    estimated_savings: savings.round_dp_with_strategy(
                        COST_SCALE,
                        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
                    ),
                    detail: format!(
                        "{} accounts for most of this key's spend; latency-insensitive \
                         traffic could use a cheaper model or the batch endpoint (50% discount)",
                        model
                    ),
                });
            }
        }

        suggestions.sort_by(|a, b| b.estimated_savings.cmp(&a.estimated_savings));
        suggestions
    }

    /// Render cost state in Prometheus exposition format.
    pub fn prometheus_text(&self) -> String {
        let (total_cost, total_requests, unknown, budgets) = {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            let now = Utc::now();
            for budget in state.budgets.values_mut() {
                budget.roll_period(now);
            }
            (
                state.total_cost,
                state.total_requests,
                state.unknown_model_requests,
                state
                    .budgets
                    .iter()
                    .map(|(k, b)| (k.clone(), b.clone()))
                    .collect::<Vec<_>>(),
            )
        };

        let mut out = String::new();

        prom::render_header(&mut out, "cost_total_usd", "Accumulated spend", "counter");
        prom::render_line(
            &mut out,
            "cost_total_usd",
            &[],
            total_cost.to_f64().unwrap_or(0.0),
        );

        prom::render_header(
            &mut out,
            "cost_requests_total",
            "Usage records ingested",
            "counter",
        );
        prom::render_line(&mut out, "cost_requests_total", &[], total_requests as f64);

        prom::render_header(
            &mut out,
            "cost_unknown_model_requests_total",
            "Usage records with no pricing data",
            "counter",
        );
        prom::render_line(
            &mut out,
            "cost_unknown_model_requests_total",
            &[],
            unknown as f64,
        );

        if !budgets.is_empty() {
            prom::render_header(
                &mut out,
                "budget_used_usd",
                "Spend in the current budget period",
                "gauge",
            );
            let mut sorted = budgets;
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, budget) in &sorted {
                let label = self.sanitizer.sanitize(key);
                prom::render_line(
                    &mut out,
                    "budget_used_usd",
                    &[("api_key", &label)],
                    budget.used.to_f64().unwrap_or(0.0),
                );
            }
            prom::render_header(&mut out, "budget_limit_usd", "Configured limit", "gauge");
            for (key, budget) in &sorted {
                let label = self.sanitizer.sanitize(key);
                prom::render_line(
                    &mut out,
                    "budget_limit_usd",
                    &[("api_key", &label)],
                    budget.limit.to_f64().unwrap_or(0.0),
                );
            }
            prom::render_header(
                &mut out,
                "budget_over",
                "1 when spend exceeds the limit",
                "gauge",
            );
            for (key, budget) in &sorted {
                let label = self.sanitizer.sanitize(key);
                prom::render_line(
                    &mut out,
                    "budget_over",
                    &[("api_key", &label)],
                    if budget.is_over() { 1.0 } else { 0.0 },
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn usd(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tracker() -> CostTracker {
        CostTracker::new(&CostConfig {
            ledger_capacity: 100,
            alert_thresholds_percent: vec![50, 80, 90, 100],
            alert_history_capacity: 50,
        })
    }

    #[test]
    fn test_record_usage_returns_cost() {
        let t = tracker();
        let cost = t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 1_000, 500, 0, Utc::now());
        assert_eq!(cost, usd("0.0075"));

        let usage = t.get_usage(&UsageFilter::default());
        assert_eq!(usage.request_count, 1);
        assert_eq!(usage.total_cost, usd("0.0075"));
    }

    #[test]
    fn test_unknown_model_is_zero_cost_but_ledgered() {
        let t = tracker();
        let cost = t.record_usage("sk-a", "mystery-9000", "/v1/completions", 10, 10, 0, Utc::now());
        assert_eq!(cost, Decimal::ZERO);

        let usage = t.get_usage(&UsageFilter::default());
        assert_eq!(usage.request_count, 1);
    }

    #[test]
    fn test_ledger_eviction_is_bounded() {
        let t = CostTracker::new(&CostConfig {
            ledger_capacity: 10,
            alert_thresholds_percent: vec![100],
            alert_history_capacity: 10,
        });
        for i in 0..25 {
            t.record_usage(
                &format!("sk-{}", i),
                "gpt-4o-mini",
                "/v1/chat/completions",
                100,
                100,
                0,
                Utc::now(),
            );
        }

        let usage = t.get_usage(&UsageFilter::default());
        assert_eq!(usage.request_count, 10);
        // Oldest keys evicted
        assert_eq!(
            t.get_usage(&UsageFilter::for_api_key("sk-0")).request_count,
            0
        );
        assert_eq!(
            t.get_usage(&UsageFilter::for_api_key("sk-24")).request_count,
            1
        );
    }

    #[test]
    fn test_budget_thresholds_fire_exactly_once() {
        let t = tracker();
        t.set_budget("sk-a", usd("10"), BudgetPeriod::Monthly, BudgetLimitType::Soft);

        // 30 increments of $0.50 (gpt-4o: 200k prompt tokens = $0.50)
        for _ in 0..30 {
            t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 200_000, 0, 0, Utc::now());
        }

        let alerts = t.recent_alerts();
        assert_eq!(alerts.len(), 4, "one alert per threshold");
        let thresholds: Vec<u8> = alerts.iter().map(|a| a.threshold_percent).collect();
        assert_eq!(thresholds, vec![50, 80, 90, 100]);
    }

    #[test]
    fn test_single_large_charge_fires_all_crossed_thresholds() {
        let t = tracker();
        t.set_budget("sk-a", usd("1"), BudgetPeriod::Daily, BudgetLimitType::Hard);

        // One $2.50 charge blows straight past every threshold
        t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 1_000_000, 0, 0, Utc::now());

        let alerts = t.recent_alerts();
        assert_eq!(alerts.len(), 4);
        assert!(t.over_budget("sk-a"));
    }

    #[test]
    fn test_over_budget_soft_and_hard_report_alike() {
        let t = tracker();
        t.set_budget("soft", usd("1"), BudgetPeriod::Daily, BudgetLimitType::Soft);
        t.set_budget("hard", usd("1"), BudgetPeriod::Daily, BudgetLimitType::Hard);

        for key in ["soft", "hard"] {
            t.record_usage(key, "gpt-4o", "/v1/chat/completions", 1_000_000, 0, 0, Utc::now());
        }

        assert!(t.over_budget("soft"));
        assert!(t.over_budget("hard"));
        assert!(!t.over_budget("no-budget-key"));
    }

    #[test]
    fn test_get_usage_filters() {
        let t = tracker();
        let now = Utc::now();
        t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 1_000, 0, 0, now);
        t.record_usage("sk-b", "claude-3-haiku", "/v1/chat/completions", 1_000, 0, 0, now);
        t.record_usage("sk-a", "claude-3-haiku", "/v1/messages", 1_000, 0, 0, now);

        assert_eq!(t.get_usage(&UsageFilter::default()).request_count, 3);
        assert_eq!(
            t.get_usage(&UsageFilter::for_api_key("sk-a")).request_count,
            2
        );
        let filter = UsageFilter {
            model: Some("claude-3-haiku".to_string()),
            ..Default::default()
        };
        let summary = t.get_usage(&filter);
        assert_eq!(summary.request_count, 2);
        assert!(summary.by_model.contains_key("claude-3-haiku"));
    }

    #[test]
    fn test_caching_suggestion_for_uncached_volume() {
        let t = tracker();
        // 500k uncached prompt tokens on gpt-4o (cache-discounted model)
        for _ in 0..5 {
            t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 100_000, 1_000, 0, Utc::now());
        }

        let suggestions = t.get_optimization_suggestions(Some("sk-a"));
        assert!(suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::EnablePromptCaching && s.model == "gpt-4o"));
        let caching = suggestions
            .iter()
            .find(|s| s.kind == SuggestionKind::EnablePromptCaching)
            .unwrap();
        // 250k repeat tokens at (2.50 - 1.25)/1M
        assert_eq!(caching.estimated_savings, usd("0.3125"));
    }

    #[test]
    fn test_batch_suggestion_for_premium_dominated_key() {
        let t = tracker();
        for _ in 0..12 {
            t.record_usage("sk-a", "claude-3-opus", "/v1/messages", 10_000, 2_000, 0, Utc::now());
        }

        let suggestions = t.get_optimization_suggestions(Some("sk-a"));
        let batch = suggestions
            .iter()
            .find(|s| s.kind == SuggestionKind::UseBatchProcessing)
            .expect("expected a batch suggestion");
        assert_eq!(batch.model, "claude-3-opus");
        assert!(batch.estimated_savings > Decimal::ZERO);
    }

    #[test]
    fn test_no_suggestions_for_light_usage() {
        let t = tracker();
        t.record_usage("sk-a", "gpt-4o-mini", "/v1/chat/completions", 500, 100, 0, Utc::now());
        assert!(t.get_optimization_suggestions(Some("sk-a")).is_empty());
    }

    #[test]
    fn test_prometheus_text_contains_totals() {
        let t = tracker();
        t.set_budget("sk-a", usd("10"), BudgetPeriod::Monthly, BudgetLimitType::Soft);
        t.record_usage("sk-a", "gpt-4o", "/v1/chat/completions", 1_000_000, 0, 0, Utc::now());

        let text = t.prometheus_text();
        assert!(text.contains("cost_total_usd 2.5"));
        assert!(text.contains("cost_requests_total 1"));
        assert!(text.contains("budget_used_usd{api_key=\"sk_a\"} 2.5"));
        assert!(text.contains("budget_over{api_key=\"sk_a\"} 0"));
    }
}
