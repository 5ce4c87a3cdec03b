//! Lifecycle event types
//!
//! Every simulated request or stream emits discrete events at each lifecycle
//! transition (start, token, completion, failure). Events are immutable once
//! constructed; ownership transfers to the bus on publish.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Validation failures rejected at the publish boundary.
///
/// An invalid event is never enqueued; the publisher sees the error directly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("correlation id must not be empty")]
    EmptyCorrelationId,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("token_count_delta must be >= 1")]
    ZeroTokenDelta,

    #[error("invalid HTTP status code: {0}")]
    InvalidStatusCode(u16),

    #[error("cached_tokens ({cached}) exceeds prompt_tokens ({prompt})")]
    CachedExceedsPrompt { cached: u64, prompt: u64 },
}

/// Discriminator for event variants, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StreamStarted,
    TokenGenerated,
    FirstTokenGenerated,
    StreamBackpressure,
    StreamCompleted,
    StreamFailed,
    ErrorOccurred,
    RequestCompleted,
    RequestFailed,
}

impl EventType {
    /// All variants, in declaration order. Used when a subscriber listens to
    /// the full lifecycle of one entity kind.
    pub const ALL: [EventType; 9] = [
        EventType::StreamStarted,
        EventType::TokenGenerated,
        EventType::FirstTokenGenerated,
        EventType::StreamBackpressure,
        EventType::StreamCompleted,
        EventType::StreamFailed,
        EventType::ErrorOccurred,
        EventType::RequestCompleted,
        EventType::RequestFailed,
    ];
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::StreamStarted => "stream_started",
            EventType::TokenGenerated => "token_generated",
            EventType::FirstTokenGenerated => "first_token_generated",
            EventType::StreamBackpressure => "stream_backpressure",
            EventType::StreamCompleted => "stream_completed",
            EventType::StreamFailed => "stream_failed",
            EventType::ErrorOccurred => "error_occurred",
            EventType::RequestCompleted => "request_completed",
            EventType::RequestFailed => "request_failed",
        };
        write!(f, "{}", s)
    }
}

/// Variant-specific payload of a lifecycle event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A simulated stream began producing output
    StreamStarted {
        /// Model serving the stream
        model: String,
    },
    /// One or more tokens were generated on an active stream
    TokenGenerated {
        /// Number of tokens in this batch (>= 1)
        token_count_delta: u32,
    },
    /// The first token of a stream was generated (TTFT boundary)
    FirstTokenGenerated,
    /// The stream's consumer stalled and the producer had to wait
    StreamBackpressure,
    /// The stream finished normally
    StreamCompleted {
        /// Total tokens generated over the stream's lifetime
        total_tokens: u64,
    },
    /// The stream ended in a terminal failure
    StreamFailed {
        /// Terminal reason (e.g., "client_disconnect")
        reason: String,
    },
    /// A simulated API error was returned to a client
    ErrorOccurred {
        /// Endpoint path (e.g., "/v1/chat/completions")
        endpoint: String,
        /// Error class (e.g., "RateLimitError")
        error_type: String,
        /// Human-readable message; variable parts are normalized away
        /// during fingerprinting
        message: String,
        /// Model involved, when known
        model: Option<String>,
        /// HTTP status returned to the client
        status_code: u16,
    },
    /// A simulated request completed successfully
    RequestCompleted {
        /// API key that issued the request
        api_key: String,
        /// Model that served it
        model: String,
        /// Endpoint path
        endpoint: String,
        /// Prompt (input) tokens
        prompt_tokens: u64,
        /// Completion (output) tokens
        completion_tokens: u64,
        /// Prompt tokens served from the KV-cache simulator
        cached_tokens: u64,
    },
    /// A simulated request failed before completing
    RequestFailed {
        /// Endpoint path
        endpoint: String,
        /// Error class
        error_type: String,
    },
}

/// An immutable lifecycle event.
///
/// `correlation_id` ties every event of one request/stream together; the bus
/// routes all events sharing a correlation id to the same dispatch worker so
/// they are processed in publish order.
#[derive(Debug, Clone)]
pub struct Event {
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
    /// Request or stream id
    pub correlation_id: String,
    /// Variant payload
    pub payload: EventPayload,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(correlation_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Override the timestamp (simulated clocks, replay, tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The variant discriminator for subscription matching.
    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::StreamStarted { .. } => EventType::StreamStarted,
            EventPayload::TokenGenerated { .. } => EventType::TokenGenerated,
            EventPayload::FirstTokenGenerated => EventType::FirstTokenGenerated,
            EventPayload::StreamBackpressure => EventType::StreamBackpressure,
            EventPayload::StreamCompleted { .. } => EventType::StreamCompleted,
            EventPayload::StreamFailed { .. } => EventType::StreamFailed,
            EventPayload::ErrorOccurred { .. } => EventType::ErrorOccurred,
            EventPayload::RequestCompleted { .. } => EventType::RequestCompleted,
            EventPayload::RequestFailed { .. } => EventType::RequestFailed,
        }
    }

    /// Validate payload fields at the publish boundary.
    ///
    /// Invalid events are rejected before enqueue and never reach a
    /// subscriber.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.correlation_id.is_empty() {
            return Err(EventError::EmptyCorrelationId);
        }

        match &self.payload {
            EventPayload::StreamStarted { model } => {
                if model.is_empty() {
                    return Err(EventError::EmptyField("model"));
                }
            }
            EventPayload::TokenGenerated { token_count_delta } => {
                if *token_count_delta == 0 {
                    return Err(EventError::ZeroTokenDelta);
                }
            }
            EventPayload::StreamFailed { reason } => {
                if reason.is_empty() {
                    return Err(EventError::EmptyField("reason"));
                }
            }
            EventPayload::ErrorOccurred {
                endpoint,
                error_type,
                status_code,
                ..
            } => {
                if endpoint.is_empty() {
                    return Err(EventError::EmptyField("endpoint"));
                }
                if error_type.is_empty() {
                    return Err(EventError::EmptyField("error_type"));
                }
                if !(100..=599).contains(status_code) {
                    return Err(EventError::InvalidStatusCode(*status_code));
                }
            }
            EventPayload::RequestCompleted {
                api_key,
                model,
                endpoint,
                prompt_tokens,
                cached_tokens,
                ..
            } => {
                if api_key.is_empty() {
                    return Err(EventError::EmptyField("api_key"));
                }
                if model.is_empty() {
                    return Err(EventError::EmptyField("model"));
                }
                if endpoint.is_empty() {
                    return Err(EventError::EmptyField("endpoint"));
                }
                if cached_tokens > prompt_tokens {
                    return Err(EventError::CachedExceedsPrompt {
                        cached: *cached_tokens,
                        prompt: *prompt_tokens,
                    });
                }
            }
            EventPayload::RequestFailed {
                endpoint,
                error_type,
            } => {
                if endpoint.is_empty() {
                    return Err(EventError::EmptyField("endpoint"));
                }
                if error_type.is_empty() {
                    return Err(EventError::EmptyField("error_type"));
                }
            }
            EventPayload::FirstTokenGenerated
            | EventPayload::StreamBackpressure
            | EventPayload::StreamCompleted { .. } => {}
        }

        Ok(())
    }
}
