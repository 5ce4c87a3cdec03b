//! Streaming metrics data types

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors from streaming tracker operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamingError {
    /// The active-stream bound was reached; the caller must not start the
    /// stream. In-flight streams are never evicted to make room, since their
    /// measurement state cannot be discarded safely.
    #[error("too many active streams ({active}/{max})")]
    TooManyActiveStreams { active: usize, max: usize },

    #[error("stream already active: {0}")]
    DuplicateStream(String),
}

/// Mutable per-stream measurement state.
///
/// Owned exclusively by the tracker while the stream is active; converted to
/// a [`CompletedStreamRecord`] on the terminal transition and removed from
/// the active set.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub stream_id: String,
    pub model: String,
    pub start_time: DateTime<Utc>,
    pub first_token_time: Option<DateTime<Utc>>,
    /// Timestamp of every token batch, in arrival order
    pub token_timestamps: Vec<DateTime<Utc>>,
    pub tokens_generated: u64,
    pub backpressure_count: u64,
}

impl StreamState {
    pub fn new(stream_id: String, model: String, start_time: DateTime<Utc>) -> Self {
        Self {
            stream_id,
            model,
            start_time,
            first_token_time: None,
            token_timestamps: Vec::new(),
            tokens_generated: 0,
            backpressure_count: 0,
        }
    }
}

/// Terminal state of a finished stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StreamOutcome {
    Completed,
    Failed {
        /// Terminal reason carried on the failure event
        reason: String,
    },
}

/// Immutable snapshot of a finished stream, retained in the bounded history
/// purely for aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedStreamRecord {
    pub stream_id: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Time to first token in milliseconds, when a first token was observed
    pub ttft_ms: Option<f64>,
    /// Deltas between consecutive token timestamps, in milliseconds
    pub itl_ms: Vec<f64>,
    pub tokens_generated: u64,
    /// Throughput over the stream's lifetime, when measurable
    pub tokens_per_second: Option<f64>,
    pub backpressure_count: u64,
    pub outcome: StreamOutcome,
}

/// Exact order-statistic percentiles over one sample population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Aggregate streaming statistics for a read window.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    /// Streams currently in flight
    pub active_count: usize,
    /// Streams that completed normally within the window
    pub completed_count: u64,
    /// Streams that ended in failure within the window
    pub failed_count: u64,
    /// Time-to-first-token percentiles in milliseconds, None when no samples
    pub ttft_ms: Option<Percentiles>,
    /// Inter-token latency percentiles over the union of all deltas in the
    /// window, in milliseconds
    pub itl_ms: Option<Percentiles>,
    /// Per-stream throughput percentiles
    pub tokens_per_second: Option<Percentiles>,
    /// completed / (completed + failed); 1.0 when no stream has terminated
    pub success_rate: f64,
    /// Lifetime backpressure tick total
    pub backpressure_total: u64,
}
