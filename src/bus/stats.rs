//! Bus counter snapshots for the stats surface.

use serde::Serialize;

/// Point-in-time snapshot of bus delivery counters.
///
/// After a graceful drain, `published == dispatched + dropped` holds exactly:
/// every accepted event is either fully processed by a worker or counted
/// against the drop counter.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    /// Events accepted at the publish boundary (validation passed)
    pub published: u64,
    /// Events fully processed by a dispatch worker
    pub dispatched: u64,
    /// Events dropped because the target shard queue was full or the bus
    /// was shut down
    pub dropped: u64,
    /// Events rejected at the publish boundary (never enqueued, not counted
    /// in `published`)
    pub rejected: u64,
    /// Current total depth across all shard queues
    pub queue_depth: usize,
    /// Per-subscriber delivery counters
    pub subscribers: Vec<SubscriberStats>,
}

/// Delivery counters for one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStats {
    /// Subscription handle
    pub id: u64,
    /// Handler name (stable across event types)
    pub name: String,
    /// Event type this subscription matches
    pub event_type: String,
    /// Dispatch priority (higher runs first)
    pub priority: u8,
    /// Successful handler invocations
    pub invocations: u64,
    /// Failed handler invocations
    pub failures: u64,
    /// Dispatches skipped because the circuit was open
    pub skipped: u64,
    /// Whether the circuit is currently open
    pub circuit_open: bool,
    /// Lifetime count of circuit-open transitions
    pub circuit_open_count: u64,
}
