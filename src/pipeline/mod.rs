//! # Metrics Pipeline Composition Root
//!
//! Owns the event bus and the three trackers, and wires the subscriber
//! adapters at startup. Hosts construct one pipeline, publish lifecycle
//! events into it from the transport layer, and read tracker snapshots
//! directly for metrics/health endpoints (reads bypass the bus).
//!
//! Error and cost tracking register at higher priority than pure streaming
//! stats: budget and SLO visibility is the more operationally urgent signal.

pub mod subscribers;

pub use subscribers::{CostSubscriber, SloSubscriber, StreamingSubscriber};

use crate::bus::EventBus;
use crate::config::FakeAiConfig;
use crate::cost::CostTracker;
use crate::events::{Event, EventError, EventType};
use crate::slo::ErrorMetricsTracker;
use crate::streaming::StreamingMetricsTracker;
use std::sync::Arc;

/// Dispatch priority for the error/SLO subscriber.
pub const PRIORITY_SLO: u8 = 30;
/// Dispatch priority for the cost subscriber.
pub const PRIORITY_COST: u8 = 20;
/// Dispatch priority for the streaming subscriber.
pub const PRIORITY_STREAMING: u8 = 10;

const STREAMING_EVENTS: [EventType; 6] = [
    EventType::StreamStarted,
    EventType::TokenGenerated,
    EventType::FirstTokenGenerated,
    EventType::StreamBackpressure,
    EventType::StreamCompleted,
    EventType::StreamFailed,
];

const SLO_EVENTS: [EventType; 3] = [
    EventType::ErrorOccurred,
    EventType::RequestCompleted,
    EventType::RequestFailed,
];

/// The assembled metrics pipeline: one bus, three trackers, wired once.
pub struct MetricsPipeline {
    bus: Arc<EventBus>,
    streaming: Arc<StreamingMetricsTracker>,
    errors: Arc<ErrorMetricsTracker>,
    cost: Arc<CostTracker>,
}

impl MetricsPipeline {
    /// Construct the trackers and bus from config and register the
    /// subscriber adapters. Must be called within a tokio runtime.
    pub fn new(config: &FakeAiConfig) -> Self {
        let bus = Arc::new(EventBus::new(&config.bus));
        let streaming = Arc::new(StreamingMetricsTracker::new(&config.streaming));
        let errors = Arc::new(ErrorMetricsTracker::new(&config.slo));
        let cost = Arc::new(CostTracker::new(&config.cost));

        let slo_handler = Arc::new(SloSubscriber::new(Arc::clone(&errors)));
        for event_type in SLO_EVENTS {
            bus.subscribe(event_type, PRIORITY_SLO, slo_handler.clone());
        }

        let cost_handler = Arc::new(CostSubscriber::new(Arc::clone(&cost)));
        bus.subscribe(EventType::RequestCompleted, PRIORITY_COST, cost_handler);

        let streaming_handler = Arc::new(StreamingSubscriber::new(Arc::clone(&streaming)));
        for event_type in STREAMING_EVENTS {
            bus.subscribe(event_type, PRIORITY_STREAMING, streaming_handler.clone());
        }

        tracing::info!("Metrics pipeline wired");

        Self {
            bus,
            streaming,
            errors,
            cost,
        }
    }

    /// Publish one lifecycle event into the bus.
    pub fn publish(&self, event: Event) -> Result<(), EventError> {
        self.bus.publish(event)
    }

    /// The shared event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The streaming-performance tracker (snapshot reads bypass the bus).
    pub fn streaming(&self) -> &Arc<StreamingMetricsTracker> {
        &self.streaming
    }

    /// The error/SLO tracker.
    pub fn errors(&self) -> &Arc<ErrorMetricsTracker> {
        &self.errors
    }

    /// The cost tracker.
    pub fn cost(&self) -> &Arc<CostTracker> {
        &self.cost
    }

    /// Concatenated Prometheus exposition text from all trackers, for an
    /// external `/metrics` handler.
    pub fn prometheus_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.streaming.prometheus_text());
        out.push_str(&self.errors.prometheus_text());
        out.push_str(&self.cost.prometheus_text());
        out
    }

    /// Graceful shutdown: drain the bus so every accepted event is either
    /// dispatched or counted dropped.
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_wires_all_subscriptions() {
        let pipeline = MetricsPipeline::new(&FakeAiConfig::default());
        let stats = pipeline.bus().stats();
        // 3 SLO + 1 cost + 6 streaming
        assert_eq!(stats.subscribers.len(), 10);

        let slo_subs = stats
            .subscribers
            .iter()
            .filter(|s| s.name == "error-metrics")
            .count();
        assert_eq!(slo_subs, 3);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn higher_priority_for_slo_and_cost() {
        let pipeline = MetricsPipeline::new(&FakeAiConfig::default());
        let stats = pipeline.bus().stats();

        for sub in &stats.subscribers {
            match sub.name.as_str() {
                "error-metrics" => assert_eq!(sub.priority, PRIORITY_SLO),
                "cost-tracker" => assert_eq!(sub.priority, PRIORITY_COST),
                "streaming-metrics" => assert_eq!(sub.priority, PRIORITY_STREAMING),
                other => panic!("unexpected subscriber {}", other),
            }
            assert!(sub.priority >= PRIORITY_STREAMING);
        }

        pipeline.shutdown().await;
    }
}
