//! # Streaming Performance Tracker
//!
//! Maintains per-stream state machines (`active -> completed | failed`)
//! driven by discrete lifecycle events, and derives TTFT / inter-token
//! latency / throughput statistics over a bounded completed-stream history.
//!
//! ## Memory bounds
//!
//! - The active set is bounded by an admission check: starting a stream above
//!   `max_active_streams` is rejected with an explicit error rather than
//!   evicting an in-flight stream.
//! - Completed history is a fixed-capacity FIFO; insertion past capacity
//!   evicts the oldest record.
//!
//! ## Read path
//!
//! `get_metrics` copies a snapshot out from under the lock, releases it, and
//! does the O(n log n) percentile work on the snapshot. Results are cached
//! per window argument with a short TTL so high query rates do not re-sort
//! large samples every call.

pub mod percentile;
pub mod types;

pub use types::{
    AggregateMetrics, CompletedStreamRecord, Percentiles, StreamOutcome, StreamState,
    StreamingError,
};

use crate::config::StreamingConfig;
use crate::prom;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct StreamingState {
    active: HashMap<String, StreamState>,
    history: VecDeque<CompletedStreamRecord>,
    completed_total: u64,
    failed_total: u64,
    backpressure_total: u64,
}

/// Tracks active and completed simulated streams and answers aggregate
/// latency/throughput queries.
pub struct StreamingMetricsTracker {
    state: Mutex<StreamingState>,
    cache: Mutex<HashMap<Option<u64>, (Instant, AggregateMetrics)>>,
    max_active_streams: usize,
    history_capacity: usize,
    cache_ttl: Duration,
}

impl StreamingMetricsTracker {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            state: Mutex::new(StreamingState {
                active: HashMap::new(),
                history: VecDeque::with_capacity(config.history_capacity),
                completed_total: 0,
                failed_total: 0,
                backpressure_total: 0,
            }),
            cache: Mutex::new(HashMap::new()),
            max_active_streams: config.max_active_streams,
            history_capacity: config.history_capacity,
            cache_ttl: Duration::from_secs(config.metrics_cache_ttl_secs),
        }
    }

    /// Admit a new stream into the active set.
    ///
    /// Rejects above the concurrent-stream bound; the caller must not start
    /// the stream.
    pub fn on_stream_started(
        &self,
        stream_id: &str,
        model: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StreamingError> {
        let mut state = self.state.lock().unwrap();

        if state.active.contains_key(stream_id) {
            return Err(StreamingError::DuplicateStream(stream_id.to_string()));
        }

        if state.active.len() >= self.max_active_streams {
            return Err(StreamingError::TooManyActiveStreams {
                active: state.active.len(),
                max: self.max_active_streams,
            });
        }

        state.active.insert(
            stream_id.to_string(),
            StreamState::new(stream_id.to_string(), model.to_string(), at),
        );
        metrics::gauge!("fakeai_active_streams").set(state.active.len() as f64);
        Ok(())
    }

    /// Record a token batch on an active stream.
    ///
    /// Unknown stream ids are logged no-ops: they indicate an out-of-order or
    /// dropped event, not a fatal condition.
    pub fn on_token(&self, stream_id: &str, token_count_delta: u32, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        match state.active.get_mut(stream_id) {
            Some(stream) => {
                stream.token_timestamps.push(at);
                stream.tokens_generated += u64::from(token_count_delta);
            }
            None => warn_unknown(stream_id, "token"),
        }
    }

    /// Mark the TTFT boundary for an active stream.
    pub fn on_first_token(&self, stream_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        match state.active.get_mut(stream_id) {
            Some(stream) => {
                if stream.first_token_time.is_none() {
                    stream.first_token_time = Some(at);
                }
            }
            None => warn_unknown(stream_id, "first_token"),
        }
    }

    /// Record a backpressure tick (the stream's consumer stalled).
    pub fn on_backpressure(&self, stream_id: &str) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        match state.active.get_mut(stream_id) {
            Some(stream) => {
                stream.backpressure_count += 1;
                state.backpressure_total += 1;
            }
            None => warn_unknown(stream_id, "backpressure"),
        }
    }

    /// Finish a stream normally and move it into the completed history.
    pub fn on_stream_completed(&self, stream_id: &str, total_tokens: u64, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let Some(stream) = state.active.remove(stream_id) else {
            warn_unknown(stream_id, "completed");
            return;
        };

        if stream.tokens_generated != total_tokens {
            tracing::warn!(
                stream_id,
                counted = stream.tokens_generated,
                reported = total_tokens,
                "Completion total differs from counted tokens (dropped or reordered events)"
            );
        }

        let record = build_record(stream, at, StreamOutcome::Completed);
        push_record(&mut state.history, self.history_capacity, record);
        state.completed_total += 1;
        metrics::gauge!("fakeai_active_streams").set(state.active.len() as f64);
        metrics::counter!("fakeai_streams_completed_total").increment(1);
    }

    /// Finish a stream in failure and move it into the completed history.
    pub fn on_stream_failed(&self, stream_id: &str, reason: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let Some(stream) = state.active.remove(stream_id) else {
            warn_unknown(stream_id, "failed");
            return;
        };

        let record = build_record(
            stream,
            at,
            StreamOutcome::Failed {
                reason: reason.to_string(),
            },
        );
        push_record(&mut state.history, self.history_capacity, record);
        state.failed_total += 1;
        metrics::gauge!("fakeai_active_streams").set(state.active.len() as f64);
        metrics::counter!("fakeai_streams_failed_total", "reason" => reason.to_string())
            .increment(1);
    }

    /// Aggregate statistics over the completed records whose finish time
    /// falls within `window_seconds` of now (or the whole history when None).
    ///
    /// Cached per window argument with the configured TTL.
    pub fn get_metrics(&self, window_seconds: Option<u64>) -> AggregateMetrics {
        if let Some((computed_at, cached)) = self.cache.lock().unwrap().get(&window_seconds) {
            if computed_at.elapsed() < self.cache_ttl {
                return cached.clone();
            }
        }

        let computed = self.compute_metrics(window_seconds);
        self.cache
            .lock()
            .unwrap()
            .insert(window_seconds, (Instant::now(), computed.clone()));
        computed
    }

    fn compute_metrics(&self, window_seconds: Option<u64>) -> AggregateMetrics {
        // Snapshot under the lock; all sorting happens after release.
        let (records, active_count, backpressure_total) = {
            let state = self.state.lock().unwrap();
            let cutoff = window_seconds
                .map(|secs| Utc::now() - ChronoDuration::seconds(secs as i64));
            let records: Vec<CompletedStreamRecord> = state
                .history
                .iter()
                .filter(|r| cutoff.is_none_or(|c| r.finished_at >= c))
                .cloned()
                .collect();
            (records, state.active.len(), state.backpressure_total)
        };

        let mut completed_count = 0u64;
        let mut failed_count = 0u64;
        let mut ttft_samples = Vec::new();
        let mut itl_samples = Vec::new();
        let mut throughput_samples = Vec::new();

        for record in &records {
            match record.outcome {
                StreamOutcome::Completed => completed_count += 1,
                StreamOutcome::Failed { .. } => failed_count += 1,
            }
            if let Some(ttft) = record.ttft_ms {
                ttft_samples.push(ttft);
            }
            itl_samples.extend_from_slice(&record.itl_ms);
            if let Some(tps) = record.tokens_per_second {
                throughput_samples.push(tps);
            }
        }

        let terminal = completed_count + failed_count;
        let success_rate = if terminal == 0 {
            1.0
        } else {
            completed_count as f64 / terminal as f64
        };

        AggregateMetrics {
            active_count,
            completed_count,
            failed_count,
            ttft_ms: percentile::summarize(ttft_samples),
            itl_ms: percentile::summarize(itl_samples),
            tokens_per_second: percentile::summarize(throughput_samples),
            success_rate,
            backpressure_total,
        }
    }

    /// Per-reason failure counts over the full retained history.
    pub fn failure_reasons(&self) -> HashMap<String, u64> {
        let state = self.state.lock().unwrap();
        let mut reasons: HashMap<String, u64> = HashMap::new();
        for record in &state.history {
            if let StreamOutcome::Failed { reason } = &record.outcome {
                *reasons.entry(reason.clone()).or_default() += 1;
            }
        }
        reasons
    }

    /// Lifetime terminal-stream counters `(completed, failed)`.
    pub fn lifetime_totals(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap();
        (state.completed_total, state.failed_total)
    }

    /// Render the streaming aggregate in Prometheus exposition format.
    pub fn prometheus_text(&self) -> String {
        let m = self.get_metrics(None);
        let (completed_total, failed_total) = self.lifetime_totals();
        let mut out = String::new();

        prom::render_header(
            &mut out,
            "streaming_active_streams",
            "Streams currently in flight",
            "gauge",
        );
        prom::render_line(&mut out, "streaming_active_streams", &[], m.active_count as f64);

        prom::render_header(
            &mut out,
            "streaming_streams_completed_total",
            "Streams completed normally",
            "counter",
        );
        prom::render_line(
            &mut out,
            "streaming_streams_completed_total",
            &[],
            completed_total as f64,
        );

        prom::render_header(
            &mut out,
            "streaming_streams_failed_total",
            "Streams that ended in failure",
            "counter",
        );
        prom::render_line(
            &mut out,
            "streaming_streams_failed_total",
            &[],
            failed_total as f64,
        );

        prom::render_header(
            &mut out,
            "streaming_backpressure_total",
            "Backpressure ticks observed",
            "counter",
        );
        prom::render_line(
            &mut out,
            "streaming_backpressure_total",
            &[],
            m.backpressure_total as f64,
        );

        render_summary(
            &mut out,
            "streaming_ttft_milliseconds",
            "Time to first token",
            m.ttft_ms,
        );
        render_summary(
            &mut out,
            "streaming_itl_milliseconds",
            "Inter-token latency",
            m.itl_ms,
        );
        render_summary(
            &mut out,
            "streaming_tokens_per_second",
            "Per-stream generation throughput",
            m.tokens_per_second,
        );

        prom::render_header(
            &mut out,
            "streaming_success_rate",
            "completed / terminal streams in the sampled window",
            "gauge",
        );
        prom::render_line(&mut out, "streaming_success_rate", &[], m.success_rate);

        out
    }
}

fn render_summary(out: &mut String, name: &str, help: &str, p: Option<Percentiles>) {
    let Some(p) = p else { return };
    prom::render_header(out, name, help, "summary");
    prom::render_line(out, name, &[("quantile", "0.5")], p.p50);
    prom::render_line(out, name, &[("quantile", "0.95")], p.p95);
    prom::render_line(out, name, &[("quantile", "0.99")], p.p99);
}

fn warn_unknown(stream_id: &str, transition: &str) {
    tracing::warn!(
        stream_id,
        transition,
        "Lifecycle event for unknown stream (out-of-order or dropped)"
    );
}

fn build_record(
    stream: StreamState,
    finished_at: DateTime<Utc>,
    outcome: StreamOutcome,
) -> CompletedStreamRecord {
    let ttft_ms = stream
        .first_token_time
        .map(|t| duration_ms(stream.start_time, t));

    let itl_ms: Vec<f64> = stream
        .token_timestamps
        .windows(2)
        .map(|w| duration_ms(w[0], w[1]))
        .collect();

    let lifetime_secs = duration_ms(stream.start_time, finished_at) / 1000.0;
    let tokens_per_second = if lifetime_secs > 0.0 && stream.tokens_generated > 0 {
        Some(stream.tokens_generated as f64 / lifetime_secs)
    } else {
        None
    };

    CompletedStreamRecord {
        stream_id: stream.stream_id,
        model: stream.model,
        started_at: stream.start_time,
        finished_at,
        ttft_ms,
        itl_ms,
        tokens_generated: stream.tokens_generated,
        tokens_per_second,
        backpressure_count: stream.backpressure_count,
        outcome,
    }
}

/// Millisecond delta between two instants, floored at zero (clock skew).
fn duration_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .num_microseconds()
        .map(|us| (us as f64 / 1000.0).max(0.0))
        .unwrap_or(0.0)
}

fn push_record(
    history: &mut VecDeque<CompletedStreamRecord>,
    capacity: usize,
    record: CompletedStreamRecord,
) {
    if history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(record);
}
