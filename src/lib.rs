//! FakeAI - real-time metrics and event pipeline for a simulated LLM
//! inference API
//!
//! This library provides the core observability plumbing of the simulator:
//! a publish/subscribe event bus that fans lifecycle events out to
//! independent stateful trackers (streaming performance, error/SLO, cost),
//! each maintaining bounded, thread-safe aggregate state under high
//! concurrent write volume while answering low-latency read queries.
//!
//! The HTTP/SSE transport, request routing, and dashboard are external
//! collaborators: they publish events via [`pipeline::MetricsPipeline`] and
//! read tracker snapshots directly.

pub mod bus;
pub mod config;
pub mod cost;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod prom;
pub mod slo;
pub mod streaming;
