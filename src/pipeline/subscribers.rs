//! Subscriber adapters binding tracker update methods to bus event types.
//!
//! Adapters translate event payloads into tracker calls. Unknown-entity
//! conditions (admission rejections, duplicate streams) are logged no-ops
//! here rather than handler failures: they indicate out-of-order or dropped
//! events, and must not open the subscriber's circuit under load.

use crate::bus::{EventHandler, HandlerError};
use crate::cost::CostTracker;
use crate::events::{Event, EventPayload};
use crate::slo::ErrorMetricsTracker;
use crate::streaming::StreamingMetricsTracker;
use std::sync::Arc;

/// Feeds stream lifecycle events into the streaming tracker.
pub struct StreamingSubscriber {
    tracker: Arc<StreamingMetricsTracker>,
}

impl StreamingSubscriber {
    pub fn new(tracker: Arc<StreamingMetricsTracker>) -> Self {
        Self { tracker }
    }
}

impl EventHandler for StreamingSubscriber {
    fn name(&self) -> &str {
        "streaming-metrics"
    }

    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let stream_id = &event.correlation_id;
        match &event.payload {
            EventPayload::StreamStarted { model } => {
                if let Err(e) = self
                    .tracker
                    .on_stream_started(stream_id, model, event.timestamp)
                {
                    tracing::warn!(stream_id, error = %e, "Stream not admitted to tracker");
                }
            }
            EventPayload::TokenGenerated { token_count_delta } => {
                self.tracker
                    .on_token(stream_id, *token_count_delta, event.timestamp);
            }
            EventPayload::FirstTokenGenerated => {
                self.tracker.on_first_token(stream_id, event.timestamp);
            }
            EventPayload::StreamBackpressure => {
                self.tracker.on_backpressure(stream_id);
            }
            EventPayload::StreamCompleted { total_tokens } => {
                self.tracker
                    .on_stream_completed(stream_id, *total_tokens, event.timestamp);
            }
            EventPayload::StreamFailed { reason } => {
                self.tracker
                    .on_stream_failed(stream_id, reason, event.timestamp);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Feeds error and request-outcome events into the SLO tracker.
pub struct SloSubscriber {
    tracker: Arc<ErrorMetricsTracker>,
}

impl SloSubscriber {
    pub fn new(tracker: Arc<ErrorMetricsTracker>) -> Self {
        Self { tracker }
    }
}

impl EventHandler for SloSubscriber {
    fn name(&self) -> &str {
        "error-metrics"
    }

    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ErrorOccurred {
                endpoint,
                error_type,
                message,
                model,
                status_code,
            } => {
                self.tracker.on_error(
                    endpoint,
                    error_type,
                    message,
                    model.as_deref(),
                    *status_code,
                    event.timestamp,
                );
            }
            EventPayload::RequestCompleted { endpoint, .. } => {
                self.tracker.on_request_completed(endpoint, event.timestamp);
            }
            EventPayload::RequestFailed {
                endpoint,
                error_type,
            } => {
                self.tracker
                    .on_request_failed(endpoint, error_type, event.timestamp);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Feeds request completions into the cost tracker.
pub struct CostSubscriber {
    tracker: Arc<CostTracker>,
}

impl CostSubscriber {
    pub fn new(tracker: Arc<CostTracker>) -> Self {
        Self { tracker }
    }
}

impl EventHandler for CostSubscriber {
    fn name(&self) -> &str {
        "cost-tracker"
    }

    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if let EventPayload::RequestCompleted {
            api_key,
            model,
            endpoint,
            prompt_tokens,
            completion_tokens,
            cached_tokens,
        } = &event.payload
        {
            self.tracker.record_usage(
                api_key,
                model,
                endpoint,
                *prompt_tokens,
                *completion_tokens,
                *cached_tokens,
                event.timestamp,
            );
        }
        Ok(())
    }
}
