//! Call-budget throttle for the FMP API.
//!
//! FMP plans allow a fixed number of calls per minute; past that the API
//! stops answering. The limiter counts calls in a window that opens at the
//! first call after a reset (not on wall-clock minute boundaries) and, once
//! the budget is used up, parks the caller for whatever is left of the window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Default budget: a safety margin below the 300/min plan limit.
pub const DEFAULT_CALLS_PER_WINDOW: u64 = 280;

/// Default window duration.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Mutable window state. One per limiter, guarded by the limiter's mutex.
#[derive(Debug)]
struct RateWindow {
    completed_calls: u64,
    /// Set by the first call after a reset.
    window_start: Option<Instant>,
}

/// Point-in-time view of the current window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    pub completed_calls: u64,
    pub elapsed: Duration,
}

/// Shared call-budget limiter.
///
/// Every outbound request calls [`acquire`](Self::acquire) first. Clones of
/// the API client share one limiter through an `Arc`, so the budget holds
/// across concurrent workers.
pub struct RateLimiter {
    window: Mutex<RateWindow>,
    calls_per_window: u64,
    window_duration: Duration,
    tracker: RequestTracker,
}

impl RateLimiter {
    /// Create a limiter with explicit budget and window.
    pub fn new(calls_per_window: u64, window_duration: Duration) -> Self {
        Self {
            window: Mutex::new(RateWindow {
                completed_calls: 0,
                window_start: None,
            }),
            calls_per_window: calls_per_window.max(1),
            window_duration,
            tracker: RequestTracker::new(),
        }
    }

    /// Wait until a call may be issued, then count it.
    ///
    /// The lock is held across the throttle sleep so that every other caller
    /// queues behind the one that hit the budget.
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        if let Some(start) = window.window_start {
            let elapsed = now.duration_since(start);
            if elapsed >= self.window_duration {
                window.completed_calls = 0;
                window.window_start = None;
            } else if window.completed_calls >= self.calls_per_window {
                let wait = self.window_duration - elapsed;
                tracing::info!(
                    "Rate budget reached ({} calls in {:.1}s), sleeping {:.1}s",
                    window.completed_calls,
                    elapsed.as_secs_f64(),
                    wait.as_secs_f64()
                );
                self.tracker.record_throttle(wait);
                sleep(wait).await;
                window.completed_calls = 0;
                window.window_start = None;
            }
        }

        if window.completed_calls == 0 {
            window.window_start = Some(Instant::now());
        }
        window.completed_calls += 1;
    }

    /// Non-blocking snapshot of the current window.
    ///
    /// Returns `None` if the lock is contended (callers should treat as "unknown").
    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        let window = self.window.try_lock().ok()?;
        let elapsed = window
            .window_start
            .map(|start| Instant::now().duration_since(start))
            .unwrap_or_default();
        Some(WindowSnapshot {
            completed_calls: window.completed_calls,
            elapsed,
        })
    }

    /// Access the request tracker for recording outcomes.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// The configured budget per window.
    pub fn calls_per_window(&self) -> u64 {
        self.calls_per_window
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CALLS_PER_WINDOW, DEFAULT_WINDOW)
    }
}

/// Atomic counters tracking API request outcomes.
pub struct RequestTracker {
    pub(crate) requests_made: AtomicU64,
    pub(crate) requests_succeeded: AtomicU64,
    pub(crate) requests_failed: AtomicU64,
    pub(crate) throttle_sleeps: AtomicU64,
    /// Cumulative throttle time in milliseconds.
    pub(crate) total_throttle_ms: AtomicU64,
}

impl RequestTracker {
    fn new() -> Self {
        Self {
            requests_made: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            throttle_sleeps: AtomicU64::new(0),
            total_throttle_ms: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttle(&self, duration: Duration) {
        self.throttle_sleeps.fetch_add(1, Ordering::Relaxed);
        self.total_throttle_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            throttle_sleeps: self.throttle_sleeps.load(Ordering::Relaxed),
            total_throttle_secs: self.total_throttle_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub throttle_sleeps: u64,
    pub total_throttle_secs: f64,
}
