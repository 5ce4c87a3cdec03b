//! Event bus for lifecycle event fan-out
//!
//! Typed publish/subscribe dispatcher with priority-ordered delivery and
//! per-subscriber circuit breaking. Events are routed to a fixed pool of
//! dispatch workers sharded by `hash(correlation_id) % worker_count`, so all
//! events of one request/stream are processed by the same worker in publish
//! order while unrelated flows parallelize across workers.
//!
//! ## Backpressure
//!
//! Shard queues are bounded. A publish against a full shard drops the event
//! and increments the drop counter; `publish` never blocks. This favors
//! availability of the simulator over completeness of metrics under extreme
//! load.
//!
//! ## Failure isolation
//!
//! Each handler invocation is wrapped: an `Err` is counted against that
//! subscriber's sliding failure window and can open its circuit, but never
//! affects delivery to other subscribers of the same event.

pub mod circuit;
pub mod stats;

pub use circuit::{CircuitBreaker, CircuitState};
pub use stats::{BusStats, SubscriberStats};

use crate::config::BusConfig;
use crate::events::{Event, EventError, EventType};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Failure reported by a subscriber handler.
///
/// The bus catches these, counts them, and isolates the subscriber; they
/// never propagate to the publisher.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A subscriber handler bound to one event type.
///
/// Handlers run synchronously inside the dispatch worker's call stack and are
/// expected to do bounded-time state updates only; expensive aggregation
/// belongs on the read path.
pub trait EventHandler: Send + Sync {
    /// Stable name for logs and stats.
    fn name(&self) -> &str;

    /// Handle one event. An `Err` counts against this subscriber's circuit.
    fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Handle returned by [`EventBus::subscribe`], usable for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: u64,
    event_type: EventType,
    priority: u8,
    handler: Arc<dyn EventHandler>,
    circuit: CircuitBreaker,
    invocations: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    depth: AtomicUsize,
}

type SubscriberMap = HashMap<EventType, Vec<Arc<Subscription>>>;

struct BusShared {
    subscribers: RwLock<SubscriberMap>,
    counters: BusCounters,
}

/// Priority-dispatching, circuit-breaking event bus.
pub struct EventBus {
    shards: RwLock<Option<Vec<mpsc::Sender<Event>>>>,
    shared: Arc<BusShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    next_id: AtomicU64,
    circuit_failure_threshold: u32,
    circuit_failure_window: Duration,
    circuit_cooldown: Duration,
}

impl EventBus {
    /// Create a bus and spawn its dispatch workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: &BusConfig) -> Self {
        let workers = config.workers.max(1);
        let shard_capacity = (config.queue_capacity / workers).max(1);

        let shared = Arc::new(BusShared {
            subscribers: RwLock::new(HashMap::new()),
            counters: BusCounters::default(),
        });
        let cancel = CancellationToken::new();

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let (tx, rx) = mpsc::channel(shard_capacity);
            senders.push(tx);
            handles.push(tokio::spawn(dispatch_loop(
                worker_id,
                rx,
                Arc::clone(&shared),
                cancel.clone(),
            )));
        }

        tracing::info!(
            workers,
            shard_capacity,
            "Event bus started"
        );

        Self {
            shards: RwLock::new(Some(senders)),
            shared,
            workers: Mutex::new(handles),
            cancel,
            next_id: AtomicU64::new(1),
            circuit_failure_threshold: config.circuit_failure_threshold,
            circuit_failure_window: Duration::from_secs(config.circuit_failure_window_secs),
            circuit_cooldown: Duration::from_secs(config.circuit_cooldown_secs),
        }
    }

    /// Publish an event for asynchronous dispatch.
    ///
    /// Returns an error only for validation failures; a full shard queue
    /// drops the event silently (counted in `dropped`). Never blocks.
    pub fn publish(&self, event: Event) -> Result<(), EventError> {
        if let Err(e) = event.validate() {
            self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                correlation_id = %event.correlation_id,
                event_type = %event.event_type(),
                error = %e,
                "Rejected invalid event at publish boundary"
            );
            return Err(e);
        }

        self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("fakeai_events_published_total").increment(1);

        let shards = self.shards.read().unwrap();
        let Some(senders) = shards.as_ref() else {
            // Bus already shut down: accept-and-drop keeps the accounting
            // identity intact.
            self.drop_event(&event, "bus_closed");
            return Ok(());
        };

        let shard = shard_index(&event.correlation_id, senders.len());
        match senders[shard].try_send(event) {
            Ok(()) => {
                let depth = self.shared.counters.depth.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::gauge!("fakeai_bus_queue_depth").set(depth as f64);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.drop_event(&event, "queue_full");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.drop_event(&event, "bus_closed");
                Ok(())
            }
        }
    }

    fn drop_event(&self, event: &Event, reason: &'static str) {
        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("fakeai_events_dropped_total", "reason" => reason).increment(1);
        tracing::warn!(
            correlation_id = %event.correlation_id,
            event_type = %event.event_type(),
            reason,
            "Dropped event"
        );
    }

    /// Register a handler for one event type.
    ///
    /// Handlers for an event run in descending `priority` order; ties run in
    /// registration order.
    pub fn subscribe(
        &self,
        event_type: EventType,
        priority: u8,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            id,
            event_type,
            priority,
            handler,
            circuit: CircuitBreaker::new(
                self.circuit_failure_threshold,
                self.circuit_failure_window,
                self.circuit_cooldown,
            ),
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        });

        let mut map = self.shared.subscribers.write().unwrap();
        let entry = map.entry(event_type).or_default();
        entry.push(subscription);
        // Stable sort keeps registration order within a priority level.
        entry.sort_by(|a, b| b.priority.cmp(&a.priority));

        SubscriptionId(id)
    }

    /// Remove a subscription. No-op if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut map = self.shared.subscribers.write().unwrap();
        for subs in map.values_mut() {
            subs.retain(|s| s.id != id.0);
        }
    }

    /// Snapshot of delivery counters and per-subscriber state.
    pub fn stats(&self) -> BusStats {
        let counters = &self.shared.counters;
        let map = self.shared.subscribers.read().unwrap();
        let mut subscribers: Vec<SubscriberStats> = map
            .values()
            .flatten()
            .map(|s| SubscriberStats {
                id: s.id,
                name: s.handler.name().to_string(),
                event_type: s.event_type.to_string(),
                priority: s.priority,
                invocations: s.invocations.load(Ordering::Relaxed),
                failures: s.failures.load(Ordering::Relaxed),
                skipped: s.skipped.load(Ordering::Relaxed),
                circuit_open: s.circuit.state() == CircuitState::Open,
                circuit_open_count: s.circuit.open_count(),
            })
            .collect();
        subscribers.sort_by_key(|s| s.id);

        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            queue_depth: counters.depth.load(Ordering::Relaxed),
            subscribers,
        }
    }

    /// Graceful shutdown: stop intake, let workers process everything already
    /// queued, then join them.
    ///
    /// Callers should stop publishing before invoking this; late publishes
    /// are counted as dropped.
    pub async fn shutdown(&self) {
        // Dropping the senders closes the shard channels; each worker drains
        // its queue to completion and exits on `recv() == None`.
        self.shards.write().unwrap().take();
        self.join_workers().await;
        tracing::info!("Event bus stopped");
    }

    /// Abort: stop workers without processing the backlog. Queued events are
    /// drained and counted as dropped so the accounting identity holds.
    pub async fn abort(&self) {
        self.shards.write().unwrap().take();
        self.cancel.cancel();
        self.join_workers().await;
        tracing::info!("Event bus aborted");
    }

    async fn join_workers(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap();
            workers.drain(..).collect()
        };
        futures::future::join_all(handles).await;
    }
}

fn shard_index(correlation_id: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    correlation_id.hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}

/// Per-worker dispatch loop.
///
/// Processes one event fully (all handler invocations, priority-descending)
/// before taking the next, which is what preserves per-correlation ordering.
async fn dispatch_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<Event>,
    shared: Arc<BusShared>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Dispatch worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Abort path: drain the backlog as dropped.
                while let Ok(event) = rx.try_recv() {
                    shared.counters.depth.fetch_sub(1, Ordering::Relaxed);
                    shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("fakeai_events_dropped_total", "reason" => "aborted")
                        .increment(1);
                    tracing::debug!(
                        correlation_id = %event.correlation_id,
                        "Dropped queued event on abort"
                    );
                }
                break;
            }
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let depth = shared.counters.depth.fetch_sub(1, Ordering::Relaxed) - 1;
                        metrics::gauge!("fakeai_bus_queue_depth").set(depth as f64);
                        dispatch_event(&shared, &event);
                        shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    }
                    // Senders dropped: graceful shutdown, queue fully drained.
                    None => break,
                }
            }
        }
    }

    tracing::debug!(worker_id, "Dispatch worker stopped");
}

fn dispatch_event(shared: &BusShared, event: &Event) {
    let targets: Vec<Arc<Subscription>> = {
        let map = shared.subscribers.read().unwrap();
        match map.get(&event.event_type()) {
            Some(subs) => subs.clone(),
            None => return,
        }
    };

    for sub in &targets {
        if !sub.circuit.allow() {
            sub.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        match sub.handler.handle(event) {
            Ok(()) => {
                sub.invocations.fetch_add(1, Ordering::Relaxed);
                sub.circuit.record_success();
            }
            Err(e) => {
                sub.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    "fakeai_subscriber_failures_total",
                    "subscriber" => sub.handler.name().to_string()
                )
                .increment(1);
                let opened = sub.circuit.record_failure();
                tracing::warn!(
                    subscriber = sub.handler.name(),
                    event_type = %event.event_type(),
                    correlation_id = %event.correlation_id,
                    error = %e,
                    "Subscriber handler failed"
                );
                if opened {
                    metrics::counter!(
                        "fakeai_circuit_opened_total",
                        "subscriber" => sub.handler.name().to_string()
                    )
                    .increment(1);
                    tracing::error!(
                        subscriber = sub.handler.name(),
                        "Subscriber circuit opened"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPayload;
    use std::sync::atomic::AtomicBool;

    fn test_config() -> BusConfig {
        BusConfig {
            workers: 2,
            queue_capacity: 64,
            circuit_failure_threshold: 3,
            circuit_failure_window_secs: 60,
            circuit_cooldown_secs: 30,
        }
    }

    struct RecordingHandler {
        name: String,
        seen: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingHandler {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn handle(&self, event: &Event) -> Result<(), HandlerError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(HandlerError::new("induced failure"));
            }
            self.seen
                .lock()
                .unwrap()
                .push(event.correlation_id.clone());
            Ok(())
        }
    }

    fn token_event(correlation_id: &str) -> Event {
        Event::new(correlation_id, EventPayload::TokenGenerated {
            token_count_delta: 1,
        })
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = EventBus::new(&test_config());
        let handler = RecordingHandler::new("recorder");
        bus.subscribe(EventType::TokenGenerated, 10, handler.clone());

        bus.publish(token_event("s-1")).unwrap();
        bus.shutdown().await;

        assert_eq!(handler.seen(), vec!["s-1".to_string()]);
        let stats = bus.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn invalid_event_rejected_not_enqueued() {
        let bus = EventBus::new(&test_config());
        let result = bus.publish(Event::new("", EventPayload::FirstTokenGenerated));
        assert!(result.is_err());

        bus.shutdown().await;
        let stats = bus.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn same_correlation_id_preserves_publish_order() {
        let bus = EventBus::new(&test_config());

        struct TypeRecorder {
            seen: Mutex<Vec<EventType>>,
        }
        impl EventHandler for TypeRecorder {
            fn name(&self) -> &str {
                "type-recorder"
            }
            fn handle(&self, event: &Event) -> Result<(), HandlerError> {
                self.seen.lock().unwrap().push(event.event_type());
                Ok(())
            }
        }
        let handler = Arc::new(TypeRecorder { seen: Mutex::new(Vec::new()) });
        for et in EventType::ALL {
            bus.subscribe(et, 10, handler.clone());
        }

        bus.publish(Event::new("s-9", EventPayload::StreamStarted {
            model: "llama3:8b".to_string(),
        }))
        .unwrap();
        for _ in 0..20 {
            bus.publish(token_event("s-9")).unwrap();
        }
        bus.publish(Event::new("s-9", EventPayload::StreamCompleted {
            total_tokens: 20,
        }))
        .unwrap();
        bus.shutdown().await;

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 22);
        assert_eq!(seen[0], EventType::StreamStarted);
        assert!(seen[1..21].iter().all(|t| *t == EventType::TokenGenerated));
        assert_eq!(seen[21], EventType::StreamCompleted);
    }

    #[tokio::test]
    async fn priority_order_is_descending() {
        let bus = EventBus::new(&BusConfig {
            workers: 1,
            ..test_config()
        });

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        struct OrderHandler {
            tag: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl EventHandler for OrderHandler {
            fn name(&self) -> &str {
                self.tag
            }
            fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
                self.order.lock().unwrap().push(self.tag);
                Ok(())
            }
        }

        bus.subscribe(
            EventType::TokenGenerated,
            5,
            Arc::new(OrderHandler { tag: "low", order: order.clone() }),
        );
        bus.subscribe(
            EventType::TokenGenerated,
            20,
            Arc::new(OrderHandler { tag: "high", order: order.clone() }),
        );
        bus.subscribe(
            EventType::TokenGenerated,
            10,
            Arc::new(OrderHandler { tag: "mid", order: order.clone() }),
        );

        bus.publish(token_event("s-1")).unwrap();
        bus.shutdown().await;

        assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_affect_healthy_one() {
        let bus = EventBus::new(&test_config());
        let healthy = RecordingHandler::new("healthy");
        let failing = RecordingHandler::new("failing");
        failing.fail.store(true, Ordering::Relaxed);

        // Failing subscriber has the higher priority, so it runs first.
        bus.subscribe(EventType::TokenGenerated, 20, failing.clone());
        bus.subscribe(EventType::TokenGenerated, 10, healthy.clone());

        for i in 0..10 {
            bus.publish(token_event(&format!("s-{}", i))).unwrap();
        }
        bus.shutdown().await;

        assert_eq!(healthy.seen().len(), 10);
        let stats = bus.stats();
        let failing_stats = stats
            .subscribers
            .iter()
            .find(|s| s.name == "failing")
            .unwrap();
        assert!(failing_stats.circuit_open);
        // Threshold 3: three failures open the circuit, the rest are skipped.
        assert_eq!(failing_stats.failures, 3);
        assert_eq!(failing_stats.skipped, 7);
    }

    #[tokio::test]
    async fn queue_full_drops_and_counts() {
        // 1 worker with capacity 1; a blocked worker forces drops.
        let bus = EventBus::new(&BusConfig {
            workers: 1,
            queue_capacity: 1,
            ..test_config()
        });

        struct SlowHandler;
        impl EventHandler for SlowHandler {
            fn name(&self) -> &str {
                "slow"
            }
            fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
                std::thread::sleep(Duration::from_millis(50));
                Ok(())
            }
        }
        bus.subscribe(EventType::TokenGenerated, 10, Arc::new(SlowHandler));

        for i in 0..20 {
            bus.publish(token_event(&format!("s-{}", i))).unwrap();
        }
        bus.shutdown().await;

        let stats = bus.stats();
        assert!(stats.dropped > 0, "expected drops with a full shard");
        assert_eq!(stats.published, 20);
        assert_eq!(stats.published, stats.dispatched + stats.dropped);
    }

    #[tokio::test]
    async fn concurrent_publish_accounting_is_exact() {
        let bus = Arc::new(EventBus::new(&test_config()));
        let handler = RecordingHandler::new("recorder");
        bus.subscribe(EventType::TokenGenerated, 10, handler);

        let mut handles = vec![];
        for p in 0..8 {
            let bus = Arc::clone(&bus);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    bus.publish(token_event(&format!("p{}-{}", p, i))).unwrap();
                }
            }));
        }
        futures::future::join_all(handles).await;
        bus.shutdown().await;

        let stats = bus.stats();
        assert_eq!(stats.published, 800);
        assert_eq!(stats.published, stats.dispatched + stats.dropped);
        assert_eq!(stats.queue_depth, 0);
    }

    #[tokio::test]
    async fn abort_counts_backlog_as_dropped() {
        let bus = EventBus::new(&BusConfig {
            workers: 1,
            queue_capacity: 16,
            ..test_config()
        });

        struct StallHandler;
        impl EventHandler for StallHandler {
            fn name(&self) -> &str {
                "stall"
            }
            fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
                std::thread::sleep(Duration::from_millis(20));
                Ok(())
            }
        }
        bus.subscribe(EventType::TokenGenerated, 10, Arc::new(StallHandler));

        for i in 0..10 {
            bus.publish(token_event(&format!("s-{}", i))).unwrap();
        }
        bus.abort().await;

        let stats = bus.stats();
        assert_eq!(stats.published, stats.dispatched + stats.dropped);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new(&test_config());
        let handler = RecordingHandler::new("recorder");
        let id = bus.subscribe(EventType::TokenGenerated, 10, handler.clone());
        bus.unsubscribe(id);

        bus.publish(token_event("s-1")).unwrap();
        bus.shutdown().await;

        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn publish_after_shutdown_counts_as_dropped() {
        let bus = EventBus::new(&test_config());
        bus.shutdown().await;

        bus.publish(token_event("s-1")).unwrap();
        let stats = bus.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.published, stats.dispatched + stats.dropped);
    }
}
