//! C3 RateLimiter: fixed-window counters over the EphemeralStore (§4.6).
//!
//! Grounded on the teacher's inline rate check in `api/v1/lobby.rs`
//! (`try_contribute`'s ping-rate guard), generalized into a table-driven
//! limiter covering the three buckets §4.6 names: join attempts, answer
//! submissions, and general message traffic.

use crate::constants::{
    ANSWER_LIMIT_MAX, ANSWER_LIMIT_WINDOW, EPHEMERAL_IO_DEADLINE, JOIN_LIMIT_MAX, JOIN_LIMIT_WINDOW,
    MESSAGE_LIMIT_MAX, MESSAGE_LIMIT_WINDOW,
};
use crate::store::{call_with_deadline, EphemeralStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Join,
    Answer,
    Message,
}

impl Bucket {
    fn window_and_max(self) -> (Duration, i64) {
        match self {
            Self::Join => (JOIN_LIMIT_WINDOW, JOIN_LIMIT_MAX),
            Self::Answer => (ANSWER_LIMIT_WINDOW, ANSWER_LIMIT_MAX),
            Self::Message => (MESSAGE_LIMIT_WINDOW, MESSAGE_LIMIT_MAX),
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            Self::Join => "rl:join",
            Self::Answer => "rl:answer",
            Self::Message => "rl:message",
        }
    }

    /// The bucket's full window, used as a conservative `retryAfterMs` hint
    /// on `rate_limit_exceeded` — not the exact time until the next slot
    /// frees up, since a fixed-window counter doesn't track that.
    pub fn window_millis(self) -> i64 {
        self.window_and_max().0.as_millis() as i64
    }
}

pub struct RateLimiter {
    store: Arc<dyn EphemeralStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }

    /// Returns `true` if `subject` (a participant id, connection id, or IP
    /// depending on bucket) is still within its limit for `bucket`. On a
    /// backend error or a call that exceeds `EPHEMERAL_IO_DEADLINE`, fails
    /// open: a rate limiter that cannot be consulted in time must never
    /// itself become the reason a request is rejected (§4.6/§5/§9).
    pub async fn check(&self, bucket: Bucket, subject: &str) -> bool {
        let (window, max) = bucket.window_and_max();
        let key = format!("{}:{}", bucket.key_prefix(), subject);
        match call_with_deadline("rate_limiter.incr", EPHEMERAL_IO_DEADLINE, self.store.incr(&key, window)).await {
            Some(count) => count <= max,
            None => true,
        }
    }

    /// `Bucket::Answer`'s key is `{participantId}:{questionId}` (§4.6), not
    /// just `participantId` — otherwise the one-answer-per-5-minutes window
    /// would block a participant's answer to question 2 because they
    /// already answered question 1 within the same window.
    pub async fn check_answer(&self, participant_id: &str, question_id: &str) -> bool {
        self.check(Bucket::Answer, &format!("{participant_id}:{question_id}")).await
    }

    /// Clears a bucket's counter for `subject` (a bare identifier for
    /// `Join`/`Message`, `{participantId}:{questionId}` for `Answer`),
    /// for tests and moderator tooling (§4.6).
    pub async fn reset(&self, bucket: Bucket, subject: &str) -> bool {
        let key = format!("{}:{}", bucket.key_prefix(), subject);
        call_with_deadline("rate_limiter.delete", EPHEMERAL_IO_DEADLINE, self.store.delete(&key))
            .await
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ephemeral::DashMapEphemeralStore;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(Arc::new(DashMapEphemeralStore::new()));
        for _ in 0..JOIN_LIMIT_MAX {
            assert!(limiter.check(Bucket::Join, "participant-1").await);
        }
        assert!(!limiter.check(Bucket::Join, "participant-1").await);
    }

    #[tokio::test]
    async fn buckets_and_subjects_are_independent() {
        let limiter = RateLimiter::new(Arc::new(DashMapEphemeralStore::new()));
        for _ in 0..ANSWER_LIMIT_MAX {
            assert!(limiter.check(Bucket::Answer, "participant-1").await);
        }
        assert!(!limiter.check(Bucket::Answer, "participant-1").await);
        assert!(limiter.check(Bucket::Answer, "participant-2").await);
        assert!(limiter.check(Bucket::Message, "participant-1").await);
    }

    #[tokio::test]
    async fn answer_bucket_is_keyed_per_question() {
        let limiter = RateLimiter::new(Arc::new(DashMapEphemeralStore::new()));
        assert!(limiter.check_answer("participant-1", "q1").await);
        assert!(!limiter.check_answer("participant-1", "q1").await);
        assert!(limiter.check_answer("participant-1", "q2").await);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = RateLimiter::new(Arc::new(DashMapEphemeralStore::new()));
        assert!(limiter.check_answer("participant-1", "q1").await);
        assert!(!limiter.check_answer("participant-1", "q1").await);
        assert!(limiter.reset(Bucket::Answer, "participant-1:q1").await);
        assert!(limiter.check_answer("participant-1", "q1").await);
    }
}
