//! # Error Metrics and SLO Tracker
//!
//! Subscribes to error and request-outcome events and maintains:
//!
//! - a bounded ring of recent [`ErrorRecord`]s,
//! - fingerprinted [`ErrorPattern`]s (one per structurally distinct error),
//! - a rolling window of request outcomes from which error-budget and
//!   burn-rate state is derived on demand.
//!
//! ## Window storage
//!
//! Outcomes are folded into per-minute buckets, so the write path is O(1) and
//! memory is bounded by `window_secs / 60` regardless of traffic volume.

pub mod fingerprint;
pub mod types;

pub use fingerprint::{fingerprint, normalize_message};
pub use types::{ErrorMetricsSnapshot, ErrorPattern, ErrorRecord, SloStatus};

use crate::config::SloConfig;
use crate::prom::{self, LabelSanitizer};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug)]
struct OutcomeBucket {
    /// Epoch minute this bucket covers
    minute: i64,
    successes: u64,
    errors: u64,
}

struct ErrorState {
    recent: VecDeque<ErrorRecord>,
    patterns: HashMap<String, ErrorPattern>,
    buckets: VecDeque<OutcomeBucket>,
    total_errors: u64,
    errors_by_type: HashMap<String, u64>,
    errors_by_endpoint: HashMap<String, u64>,
}

/// Tracks error patterns and answers SLO / error-budget queries.
pub struct ErrorMetricsTracker {
    state: Mutex<ErrorState>,
    sanitizer: LabelSanitizer,
    target_success_rate: f64,
    window_secs: u64,
    recent_capacity: usize,
}

impl ErrorMetricsTracker {
    pub fn new(config: &SloConfig) -> Self {
        Self {
            state: Mutex::new(ErrorState {
                recent: VecDeque::with_capacity(config.recent_errors_capacity),
                patterns: HashMap::new(),
                buckets: VecDeque::new(),
                total_errors: 0,
                errors_by_type: HashMap::new(),
                errors_by_endpoint: HashMap::new(),
            }),
            sanitizer: LabelSanitizer::new(),
            target_success_rate: config.target_success_rate,
            window_secs: config.window_secs,
            recent_capacity: config.recent_errors_capacity,
        }
    }

    /// Record an API error occurrence: appends to the recent ring and
    /// creates/updates the fingerprinted pattern.
    pub fn on_error(
        &self,
        endpoint: &str,
        error_type: &str,
        message: &str,
        model: Option<&str>,
        status_code: u16,
        at: DateTime<Utc>,
    ) {
        let fp = fingerprint(error_type, endpoint, message);

        let mut state = self.state.lock().unwrap();
        state.total_errors += 1;
        *state
            .errors_by_type
            .entry(error_type.to_string())
            .or_default() += 1;
        *state
            .errors_by_endpoint
            .entry(endpoint.to_string())
            .or_default() += 1;

        if state.recent.len() >= self.recent_capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(ErrorRecord {
            timestamp: at,
            endpoint: endpoint.to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            model: model.map(str::to_string),
            status_code,
            fingerprint: fp.clone(),
        });

        let pattern = state
            .patterns
            .entry(fp.clone())
            .or_insert_with(|| ErrorPattern {
                fingerprint: fp,
                error_type: error_type.to_string(),
                endpoint: endpoint.to_string(),
                normalized_message: normalize_message(message),
                count: 0,
                first_seen: at,
                last_seen: at,
                affected_models: Default::default(),
            });
        pattern.count += 1;
        pattern.last_seen = at;
        if let Some(model) = model {
            pattern.affected_models.insert(model.to_string());
        }

        metrics::counter!(
            "fakeai_errors_total",
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    /// Mark one successful request in the SLO window.
    pub fn on_request_completed(&self, endpoint: &str, at: DateTime<Utc>) {
        tracing::trace!(endpoint, "Request completed");
        let mut state = self.state.lock().unwrap();
        self.bucket_for(&mut state, at).successes += 1;
    }

    /// Mark one failed request in the SLO window.
    pub fn on_request_failed(&self, endpoint: &str, error_type: &str, at: DateTime<Utc>) {
        tracing::debug!(endpoint, error_type, "Request failed");
        let mut state = self.state.lock().unwrap();
        self.bucket_for(&mut state, at).errors += 1;
    }

    fn bucket_for<'a>(&self, state: &'a mut ErrorState, at: DateTime<Utc>) -> &'a mut OutcomeBucket {
        let minute = at.timestamp().div_euclid(60);
        self.prune_buckets(state, Utc::now());

        // Late events (minute older than the newest bucket) fold into the
        // newest bucket to keep the deque sorted.
        let needs_new = state
            .buckets
            .back()
            .map(|b| minute > b.minute)
            .unwrap_or(true);
        if needs_new {
            state.buckets.push_back(OutcomeBucket {
                minute,
                successes: 0,
                errors: 0,
            });
        }
        state.buckets.back_mut().unwrap()
    }

    fn prune_buckets(&self, state: &mut ErrorState, now: DateTime<Utc>) {
        let oldest_minute = (now.timestamp() - self.window_secs as i64).div_euclid(60);
        while let Some(front) = state.buckets.front() {
            if front.minute < oldest_minute {
                state.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    /// Compute current SLO / error-budget state from the rolling window.
    ///
    /// With no observed requests there is no evidence of violation: the
    /// status reports `slo_violated = false` and a zero burn rate.
    pub fn get_slo_status(&self) -> SloStatus {
        let mut state = self.state.lock().unwrap();
        self.prune_buckets(&mut state, Utc::now());

        let total: u64 = state.buckets.iter().map(|b| b.successes + b.errors).sum();
        let errors: u64 = state.buckets.iter().map(|b| b.errors).sum();
        drop(state);

        let target = self.target_success_rate;
        let budget_total = ((1.0 - target) * total as f64).floor() as u64;

        let (current_success_rate, burn_rate) = if total == 0 {
            (1.0, 0.0)
        } else {
            let error_rate = errors as f64 / total as f64;
            (1.0 - error_rate, error_rate / (1.0 - target))
        };

        SloStatus {
            target_success_rate: target,
            current_success_rate,
            window_requests: total,
            error_budget_total: budget_total,
            error_budget_consumed: errors,
            error_budget_remaining: budget_total as i64 - errors as i64,
            slo_violated: errors > budget_total,
            burn_rate,
        }
    }

    /// Snapshot of error aggregates.
    pub fn get_metrics(&self) -> ErrorMetricsSnapshot {
        let state = self.state.lock().unwrap();
        ErrorMetricsSnapshot {
            total_errors: state.total_errors,
            errors_by_type: state.errors_by_type.clone(),
            errors_by_endpoint: state.errors_by_endpoint.clone(),
            recent_errors: state.recent.iter().cloned().collect(),
            pattern_count: state.patterns.len(),
        }
    }

    /// All observed error patterns, most frequent first.
    pub fn get_error_patterns(&self) -> Vec<ErrorPattern> {
        let state = self.state.lock().unwrap();
        let mut patterns: Vec<ErrorPattern> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count));
        patterns
    }

    /// Render error/SLO state in Prometheus exposition format.
    pub fn prometheus_text(&self) -> String {
        let snapshot = self.get_metrics();
        let slo = self.get_slo_status();
        let mut out = String::new();

        prom::render_header(&mut out, "errors_total", "Errors observed", "counter");
        prom::render_line(&mut out, "errors_total", &[], snapshot.total_errors as f64);

        prom::render_header(
            &mut out,
            "errors_by_type_total",
            "Errors by class",
            "counter",
        );
        let mut by_type: Vec<_> = snapshot.errors_by_type.iter().collect();
        by_type.sort();
        for (error_type, count) in by_type {
            let label = self.sanitizer.sanitize(error_type);
            prom::render_line(
                &mut out,
                "errors_by_type_total",
                &[("error_type", &label)],
                *count as f64,
            );
        }

        prom::render_header(
            &mut out,
            "error_patterns",
            "Distinct error fingerprints",
            "gauge",
        );
        prom::render_line(&mut out, "error_patterns", &[], snapshot.pattern_count as f64);

        prom::render_header(
            &mut out,
            "error_budget_total",
            "Tolerable failures in the current window",
            "gauge",
        );
        prom::render_line(&mut out, "error_budget_total", &[], slo.error_budget_total as f64);

        prom::render_header(
            &mut out,
            "error_budget_remaining",
            "Failures left before the SLO is violated",
            "gauge",
        );
        prom::render_line(
            &mut out,
            "error_budget_remaining",
            &[],
            slo.error_budget_remaining as f64,
        );

        prom::render_header(
            &mut out,
            "slo_burn_rate",
            "Actual over sustainable error rate",
            "gauge",
        );
        prom::render_line(&mut out, "slo_burn_rate", &[], slo.burn_rate);

        prom::render_header(
            &mut out,
            "slo_violated",
            "1 when the error budget is exhausted",
            "gauge",
        );
        prom::render_line(
            &mut out,
            "slo_violated",
            &[],
            if slo.slo_violated { 1.0 } else { 0.0 },
        );

        out
    }
}
