//! # Prometheus Exposition Helpers
//!
//! Shared building blocks for the trackers' `prometheus_text()` methods and
//! for the operational `metrics` facade.
//!
//! ## Two surfaces
//!
//! - Hot-path counters/gauges (queue depth, dropped events, circuit opens,
//!   budget alerts) are recorded through the `metrics` facade; hosts install
//!   the exporter once via [`setup_metrics`] and render with the returned
//!   handle.
//! - Tracker aggregates (quantile summaries, SLO state, cost totals) are
//!   computed from snapshots on the read path and hand-rendered with
//!   [`render_line`] / [`render_header`], following the standard exposition
//!   grammar: `metric_name{labels} value`.

use dashmap::DashMap;

/// Cached label sanitizer.
///
/// Prometheus label and metric names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Dynamic inputs (model ids like "llama3:8b", endpoints like
/// "/v1/chat/completions", api keys) are sanitized once and cached.
pub struct LabelSanitizer {
    cache: DashMap<String, String>,
}

impl LabelSanitizer {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Get sanitized Prometheus label (cached for performance).
    ///
    /// Replaces invalid characters with underscores and prefixes a leading
    /// digit with an underscore.
    pub fn sanitize(&self, label: &str) -> String {
        if let Some(cached) = self.cache.get(label) {
            return cached.clone();
        }

        let mut sanitized = label
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        if sanitized.is_empty() {
            sanitized.push('_');
        }

        if sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            sanitized.insert(0, '_');
        }

        self.cache.insert(label.to_string(), sanitized.clone());
        sanitized
    }
}

impl Default for LabelSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `# HELP` / `# TYPE` header lines for a metric.
pub fn render_header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} {}\n", name, kind));
}

/// Append one `metric_name{labels} value` exposition line.
///
/// Pass an empty label slice to omit the braces entirely.
pub fn render_line(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    if labels.is_empty() {
        out.push_str(&format!("{} {}\n", name, format_value(value)));
    } else {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        out.push_str(&format!(
            "{}{{{}}} {}\n",
            name,
            rendered.join(","),
            format_value(value)
        ));
    }
}

/// Render a float without trailing noise: integers print bare, fractions keep
/// their precision.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Initialize the Prometheus metrics exporter for the operational facade.
///
/// Returns a handle that renders every counter/gauge recorded through the
/// `metrics` macros (queue depth, drops, circuit opens, budget alerts).
/// Install once per process; tracker summaries are rendered separately via
/// their `prometheus_text()` methods.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_valid_names() {
        let sanitizer = LabelSanitizer::new();
        assert_eq!(sanitizer.sanitize("valid_name"), "valid_name");
        assert_eq!(sanitizer.sanitize("ValidName123"), "ValidName123");
        assert_eq!(sanitizer.sanitize("_underscore"), "_underscore");
    }

    #[test]
    fn test_sanitize_special_chars() {
        let sanitizer = LabelSanitizer::new();
        assert_eq!(sanitizer.sanitize("llama3:8b"), "llama3_8b");
        assert_eq!(
            sanitizer.sanitize("/v1/chat/completions"),
            "_v1_chat_completions"
        );
        assert_eq!(sanitizer.sanitize("sk-test@key"), "sk_test_key");
    }

    #[test]
    fn test_sanitize_leading_digit() {
        let sanitizer = LabelSanitizer::new();
        assert_eq!(sanitizer.sanitize("4o-mini"), "_4o_mini");
    }

    #[test]
    fn test_sanitize_caching() {
        let sanitizer = LabelSanitizer::new();
        let first = sanitizer.sanitize("test-label");
        let second = sanitizer.sanitize("test-label");
        assert_eq!(first, second);
        assert_eq!(first, "test_label");
    }

    #[test]
    fn test_render_line_without_labels() {
        let mut out = String::new();
        render_line(&mut out, "cost_total_usd", &[], 104.33);
        assert_eq!(out, "cost_total_usd 104.33\n");
    }

    #[test]
    fn test_render_line_with_labels() {
        let mut out = String::new();
        render_line(
            &mut out,
            "streaming_ttft_milliseconds",
            &[("quantile", "0.95")],
            35.2,
        );
        assert_eq!(out, "streaming_ttft_milliseconds{quantile=\"0.95\"} 35.2\n");
    }

    #[test]
    fn test_render_integral_value_prints_bare() {
        let mut out = String::new();
        render_line(&mut out, "error_budget_remaining", &[], 12.0);
        assert_eq!(out, "error_budget_remaining 12\n");
    }

    #[test]
    fn test_render_header() {
        let mut out = String::new();
        render_header(&mut out, "streaming_active_streams", "Active streams", "gauge");
        assert!(out.contains("# HELP streaming_active_streams Active streams"));
        assert!(out.contains("# TYPE streaming_active_streams gauge"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property test - sanitized labels always match the Prometheus
            /// label regex.
            #[test]
            fn prop_sanitized_label_is_valid_prometheus(input in "[\\x00-\\x7F]{1,50}") {
                let sanitizer = LabelSanitizer::new();
                let sanitized = sanitizer.sanitize(&input);

                prop_assert!(!sanitized.is_empty(), "Sanitized label should never be empty");

                let first = sanitized.chars().next().unwrap();
                prop_assert!(
                    first.is_ascii_alphabetic() || first == '_',
                    "First char '{}' must be letter or underscore",
                    first
                );

                for c in sanitized.chars() {
                    prop_assert!(
                        c.is_alphanumeric() || c == '_',
                        "Character '{}' is invalid in Prometheus label",
                        c
                    );
                }
            }

            /// Property: sanitize is idempotent.
            #[test]
            fn prop_sanitize_is_idempotent(input in "[a-zA-Z0-9_:\\-\\./@]{1,30}") {
                let sanitizer = LabelSanitizer::new();
                let once = sanitizer.sanitize(&input);
                let twice = sanitizer.sanitize(&once);
                prop_assert_eq!(once, twice, "Sanitization should be idempotent");
            }
        }
    }
}
