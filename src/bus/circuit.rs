//! Per-subscriber circuit breaker.
//!
//! Isolates a repeatedly failing handler: once failures exceed a threshold
//! within a sliding window the circuit opens and dispatch to that subscriber
//! is skipped until a cooldown elapses. The next dispatch after cooldown is a
//! single probe; success closes the circuit and resets the failure window,
//! failure re-opens it immediately.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit state visible in bus stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Dispatch proceeds normally
    Closed,
    /// Dispatch is skipped until cooldown elapses
    Open,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    /// Failure timestamps within the sliding window
    failures: VecDeque<Instant>,
    /// When the circuit last opened
    opened_at: Option<Instant>,
    /// Times the circuit has opened over the subscriber's lifetime
    open_count: u64,
}

/// Sliding-window failure breaker for one subscriber.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<CircuitInner>,
    failure_threshold: u32,
    failure_window: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, failure_window: Duration, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                open_count: 0,
            }),
            failure_threshold,
            failure_window,
            cooldown,
        }
    }

    /// Whether a dispatch attempt should be made right now.
    ///
    /// Closed circuits always allow. An open circuit allows exactly one probe
    /// per cooldown expiry: the probe "consumes" the expiry by re-arming
    /// `opened_at`, so concurrent dispatchers cannot all probe at once.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if expired {
                    inner.opened_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful handler invocation.
    ///
    /// Closes an open circuit (probe succeeded) and clears the failure
    /// window.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.clear();
        if inner.state == CircuitState::Open {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
        }
    }

    /// Record a failed handler invocation.
    ///
    /// Returns `true` when this failure caused a `closed -> open` transition
    /// (or re-opened the circuit after a failed probe).
    pub fn record_failure(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if inner.state == CircuitState::Open {
            // A failed probe: re-arm the cooldown from now.
            inner.opened_at = Some(now);
            inner.open_count += 1;
            return true;
        }

        while let Some(front) = inner.failures.front() {
            if now.duration_since(*front) > self.failure_window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
        inner.failures.push_back(now);

        if inner.failures.len() as u32 >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.open_count += 1;
            inner.failures.clear();
            true
        } else {
            false
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Lifetime count of `closed -> open` transitions (including re-opens).
    pub fn open_count(&self) -> u64 {
        self.inner.lock().unwrap().open_count
    }
}
