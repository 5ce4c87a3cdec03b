//! Exact order-statistic percentiles.
//!
//! Aggregation happens lazily on the read path over a snapshot copied out
//! from under the tracker lock, so an O(n log n) sort here never blocks
//! writers.

use crate::streaming::types::Percentiles;

/// Order statistic at quantile `p` using the 1-based index `ceil(p * n)`.
///
/// `sorted` must be ascending and non-empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let rank = ((p * n as f64).ceil() as usize).clamp(1, n);
    sorted[rank - 1]
}

/// Sort the samples and compute p50/p95/p99. Returns `None` for an empty
/// population.
pub fn summarize(mut samples: Vec<f64>) -> Option<Percentiles> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(Percentiles {
        p50: percentile(&samples, 0.50),
        p95: percentile(&samples, 0.95),
        p99: percentile(&samples, 0.99),
    })
}
