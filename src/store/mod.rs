//! §6 External interfaces: store contracts. Three concerns, three traits,
//! so the coordinator never has to know whether a given read is backed by
//! `dashmap` or `sqlx` (C5 EphemeralStore, C6 DurableStore, C7 AuditLog).

pub mod audit;
pub mod durable;
pub mod ephemeral;
pub mod quiz;

use crate::model::Session;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Bounds a store call to `deadline` (§5 Cancellation & timeouts): every
/// `EphemeralStore`/`DurableStore`/`AuditLog` await is wrapped here rather
/// than left to run unbounded. A timeout is logged and folded into `None`
/// alongside a plain backend error — callers already treat "no answer from
/// the store" and "the store said no" the same way (fail-open, fail-fast,
/// or background-retry, depending on the call site).
pub async fn call_with_deadline<F, T>(label: &str, deadline: Duration, fut: F) -> Option<T>
where
    F: std::future::Future<Output = eyre::Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            warn!(%error, label, "store call failed");
            None
        }
        Err(_) => {
            warn!(label, ?deadline, "store call exceeded its deadline");
            None
        }
    }
}

/// Fast, best-effort key-value storage: rate limiter counters, the
/// recovery-window session mirror. Never the system of record — an
/// EphemeralStore failure degrades a feature (fail-open, §4.6/§9), it never
/// aborts a request.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn get(&self, key: &str) -> eyre::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> eyre::Result<()>;
    async fn delete(&self, key: &str) -> eyre::Result<()>;

    /// Atomically increments the counter at `key`, setting `ttl` only on the
    /// increment that creates the key (fixed-window semantics, §4.6).
    async fn incr(&self, key: &str, ttl: Duration) -> eyre::Result<i64>;
}

/// The system of record: session snapshots survive a process restart here.
/// A DurableStore failure is a real error the caller must surface (§4.6/§9:
/// fail-open applies to EphemeralStore only).
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn save_session(&self, session: &Session) -> eyre::Result<()>;
    async fn load_session(&self, session_id: &str) -> eyre::Result<Option<Session>>;
    async fn session_exists_for_join_code(&self, join_code: &str) -> eyre::Result<bool>;

    async fn ban_participant(&self, session_id: &str, participant_id: &str) -> eyre::Result<()>;
    async fn is_banned(&self, session_id: &str, participant_id: &str) -> eyre::Result<bool>;

    /// §3 Participant: "banned participants cannot re-enter the session
    /// even with a new identity bound to the same ip". Banning a
    /// participant also bans the address they joined from; a later fresh
    /// join from that address is refused before a new identity is ever
    /// created, regardless of nickname.
    async fn ban_ip(&self, session_id: &str, ip_address: &str) -> eyre::Result<()>;
    async fn is_ip_banned(&self, session_id: &str, ip_address: &str) -> eyre::Result<bool>;
}

/// Append-only record of lifecycle events, independent of session state, so
/// a moderation or billing reviewer can reconstruct what happened without
/// replaying the full coordinator (§4.7 Non-goals still exclude analytics,
/// but the event log itself is ambient infrastructure).
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, session_id: &str, event: &str, detail: serde_json::Value) -> eyre::Result<()>;
}

/// Quiz authoring/persistence CRUD is explicitly out of scope (spec.md §1);
/// the coordinator only ever needs to read one quiz's questions and exam
/// settings once, at session creation. `QuizStore` is that one read,
/// declared as a trait so the admin surface that creates a session never
/// has to know whether quizzes live in the same database as sessions or a
/// separate authoring service.
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn load_quiz(&self, quiz_id: &str) -> eyre::Result<Option<quiz::QuizDefinition>>;
}
