//! C11 TimerScheduler: deadline-driven ticking for an active question
//! (§4.2). Grounded on the teacher's `expire_current_contributor` (a single
//! `sleep` to an absolute deadline, then a recheck against current state
//! before acting) and `clear_lobby_on_interval` (a repeating interval used
//! for a lower-frequency sweep) — generalized into one scheduler that does
//! both: a 1-second tick cadence and a final deadline.
//!
//! Never `sleep(Duration::from_secs(1))` in a loop: that drifts under load
//! and double-counts after a delayed wake. Every wait is to an absolute
//! `Instant`, and after a wake the scheduler recomputes how many ticks
//! *should* have elapsed rather than assuming exactly one did.

use crate::clock::SharedClock;
use crate::constants::TICK_INTERVAL;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining_ms: i64 },
    Expired,
}

/// One question's timer. Owned by the session actor; `poll` is called in
/// the actor's select loop against `next_wake()`.
pub struct Timer {
    clock: SharedClock,
    end_at: Instant,
    last_tick_at: Instant,
    paused_remaining: Option<std::time::Duration>,
}

impl Timer {
    pub fn start(clock: SharedClock, duration_ms: i64) -> Self {
        let now = clock.now();
        Self {
            end_at: now + std::time::Duration::from_millis(duration_ms.max(0) as u64),
            last_tick_at: now,
            clock,
            paused_remaining: None,
        }
    }

    /// The instant the select loop should wake at: the sooner of the next
    /// tick boundary or the expiry deadline. Returns `None` if paused.
    pub fn next_wake(&self) -> Option<Instant> {
        if self.paused_remaining.is_some() {
            return None;
        }
        let next_tick = self.last_tick_at + TICK_INTERVAL;
        Some(next_tick.min(self.end_at))
    }

    /// Called when the select loop wakes at or after `next_wake()`. Catches
    /// up: if more than one tick interval elapsed (a delayed wake under
    /// load), this still emits exactly the events a correct implementation
    /// would have emitted on time, in order, without skipping the terminal
    /// `Expired`.
    pub fn poll(&mut self) -> Vec<TimerEvent> {
        if self.paused_remaining.is_some() {
            return vec![];
        }
        let now = self.clock.now();
        let mut events = Vec::new();

        while self.last_tick_at + TICK_INTERVAL <= now && self.last_tick_at + TICK_INTERVAL < self.end_at {
            self.last_tick_at += TICK_INTERVAL;
            let remaining = self.end_at.saturating_duration_since(self.last_tick_at);
            events.push(TimerEvent::Tick {
                remaining_ms: remaining.as_millis() as i64,
            });
        }

        if now >= self.end_at {
            events.push(TimerEvent::Expired);
        }

        events
    }

    pub fn remaining_ms(&self) -> i64 {
        match self.paused_remaining {
            Some(remaining) => remaining.as_millis() as i64,
            None => self.end_at.saturating_duration_since(self.clock.now()).as_millis() as i64,
        }
    }

    pub fn pause(&mut self) {
        if self.paused_remaining.is_none() {
            self.paused_remaining = Some(self.end_at.saturating_duration_since(self.clock.now()));
        }
    }

    pub fn resume(&mut self) {
        if let Some(remaining) = self.paused_remaining.take() {
            let now = self.clock.now();
            self.end_at = now + remaining;
            self.last_tick_at = now;
        }
    }
}
