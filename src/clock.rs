//! C1 Clock: a single monotonic time source, injectable for tests.
//!
//! The timer scheduler and rate limiter never call `Instant::now()` or
//! `Utc::now()` directly; they go through a `Clock` so that tests can pin
//! time instead of racing the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// A monotonic time source plus a wall-clock millis reading for
/// client-facing `serverTime` fields (§4.2 Clock discipline: wall-clock is
/// for drift measurement only, never for decisions).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn now_millis(&self) -> i64;
}

/// Production clock: `tokio::time::Instant::now()` for scheduling decisions
/// (so it respects `tokio::time::pause()` in tests that opt in), real
/// wall-clock millis for display.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock with an independently steerable wall-clock reading, for tests
/// that need to assert on `serverTime` without depending on the real time
/// of day. Monotonic scheduling still goes through `tokio::time::Instant`
/// (advance it with `tokio::time::advance` under `tokio::time::pause()`).
#[derive(Clone)]
pub struct ManualClock {
    wall_millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            wall_millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn advance_millis(&self, delta: i64) {
        self.wall_millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> i64 {
        self.wall_millis.load(Ordering::SeqCst)
    }
}

pub type SharedClock = Arc<dyn Clock>;
