//! C14 RecoveryService: reattaching a disconnected participant within the
//! grace window (§4.7). Ephemeral-store fast path first, durable-store
//! fallback second — grounded on the teacher's `storage_client` being the
//! single source of truth while `lobby`'s in-memory state is the fast path
//! for everything that doesn't yet need a database round trip.

use crate::constants::{DURABLE_IO_DEADLINE, EPHEMERAL_IO_DEADLINE, LEADERBOARD_DEFAULT_TOP_N, RECOVERY_GRACE};
use crate::events::SessionRecovered;
use crate::leaderboard::{rank_of, ranked_entries};
use crate::model::{Participant, PublicQuestion, Session, SessionPhase};
use crate::store::{call_with_deadline, DurableStore, EphemeralStore};
use std::sync::Arc;
use std::time::Duration;

pub enum RecoveryOutcome {
    /// The participant reattached; here is their preserved state.
    Recovered(Participant),
    /// The participant was banned; reconnection must be refused.
    Banned,
    /// Recovery window has passed, or there is no record of this
    /// participant at all.
    NotRecoverable,
}

pub struct RecoveryService {
    ephemeral: Arc<dyn EphemeralStore>,
    durable: Arc<dyn DurableStore>,
}

impl RecoveryService {
    pub fn new(ephemeral: Arc<dyn EphemeralStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self { ephemeral, durable }
    }

    fn mirror_key(session_id: &str) -> String {
        format!("session:{session_id}:state")
    }

    /// Mirrors the session into the ephemeral store so a reconnect within
    /// the grace window is a fast read rather than a durable-store query.
    /// Failure here degrades recovery speed, never correctness — the
    /// durable store remains authoritative (§4.6/§9 fail-open policy).
    pub async fn mirror(&self, session: &Session) {
        if let Ok(bytes) = serde_json::to_vec(session) {
            call_with_deadline(
                "recovery.mirror",
                EPHEMERAL_IO_DEADLINE,
                self.ephemeral
                    .set(&Self::mirror_key(&session.id), bytes, crate::constants::SESSION_STATE_TTL),
            )
            .await;
        }
    }

    pub async fn attempt_recovery(
        &self,
        session_id: &str,
        participant_id: &str,
        now_millis: i64,
    ) -> RecoveryOutcome {
        if matches!(self.durable.is_banned(session_id, participant_id).await, Ok(true)) {
            return RecoveryOutcome::Banned;
        }

        let session = match self.load_session(session_id).await {
            Some(session) => session,
            None => return RecoveryOutcome::NotRecoverable,
        };

        let Some(participant) = session.participants.get(participant_id) else {
            return RecoveryOutcome::NotRecoverable;
        };

        let elapsed = now_millis.saturating_sub(participant.last_seen_millis);
        if elapsed > grace_window_millis() {
            return RecoveryOutcome::NotRecoverable;
        }

        RecoveryOutcome::Recovered(participant.clone())
    }

    async fn load_session(&self, session_id: &str) -> Option<Session> {
        if let Some(Some(bytes)) = call_with_deadline(
            "recovery.load_ephemeral",
            EPHEMERAL_IO_DEADLINE,
            self.ephemeral.get(&Self::mirror_key(session_id)),
        )
        .await
        {
            if let Ok(session) = serde_json::from_slice(&bytes) {
                return Some(session);
            }
        }
        call_with_deadline(
            "recovery.load_durable",
            DURABLE_IO_DEADLINE,
            self.durable.load_session(session_id),
        )
        .await
        .flatten()
    }
}

fn grace_window_millis() -> i64 {
    Duration::as_millis(&RECOVERY_GRACE) as i64
}

/// Builds the `session_recovered` snapshot (§4.7 step 6): the session's own
/// authoritative state as of the moment of the read, not a cached copy, so
/// (P6) the snapshot's score/rank/streak/elimination are correct by
/// construction.
pub fn build_snapshot(session: &Session, participant_id: &str, remaining_ms: i64) -> Option<SessionRecovered> {
    let participant = session.participants.get(participant_id)?;
    let current_question = if session.phase == SessionPhase::QuestionActive {
        session.current_question().map(PublicQuestion::from)
    } else {
        None
    };
    let has_answered_current_question = session
        .current_question()
        .map(|q| session.has_answered(participant_id, &q.id))
        .unwrap_or(false);

    Some(SessionRecovered {
        phase: session.phase,
        current_question,
        remaining_ms: if session.phase == SessionPhase::QuestionActive {
            remaining_ms.max(0)
        } else {
            0
        },
        total_score: participant.score,
        rank: rank_of(session, participant_id),
        leaderboard: ranked_entries(session, LEADERBOARD_DEFAULT_TOP_N),
        streak_count: participant.current_streak,
        is_eliminated: participant.is_eliminated,
        is_spectator: participant.is_eliminated,
        has_answered_current_question,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionPhase};
    use crate::store::durable::{connect as connect_durable};
    use crate::store::ephemeral::DashMapEphemeralStore;
    use std::collections::HashMap;

    fn participant(id: &str, last_seen_millis: i64) -> Participant {
        Participant {
            id: id.into(),
            nickname: id.into(),
            ip_address: "127.0.0.1".into(),
            connected: false,
            banned: false,
            is_eliminated: false,
            last_seen_millis,
            score: 0,
            total_time_ms: 0,
            current_streak: 0,
            focus: Default::default(),
        }
    }

    fn session_with(participant: Participant) -> Session {
        let mut participants = HashMap::new();
        participants.insert(participant.id.clone(), participant);
        Session {
            id: "s1".into(),
            join_code: "ABC123".into(),
            host_subject: "host".into(),
            phase: SessionPhase::QuestionActive,
            questions: vec![],
            current_question_index: None,
            participants,
            answers: vec![],
            allow_late_joiners: false,
            exam_settings: Default::default(),
            created_at_millis: 0,
            ended_at_millis: None,
        }
    }

    #[tokio::test]
    async fn recovers_from_ephemeral_mirror_within_grace() {
        let durable = connect_durable(&crate::store::durable::Options {
            database_url: "sqlite::memory:".into(),
            database_migrate: true,
            database_max_connections: 1,
        })
        .await
        .unwrap();
        let ephemeral = Arc::new(DashMapEphemeralStore::new());
        let service = RecoveryService::new(ephemeral.clone(), Arc::new(durable));

        let session = session_with(participant("p1", 1_000));
        service.mirror(&session).await;

        let outcome = service.attempt_recovery("s1", "p1", 2_000).await;
        assert!(matches!(outcome, RecoveryOutcome::Recovered(_)));
    }

    #[tokio::test]
    async fn refuses_recovery_past_grace_window() {
        let durable = connect_durable(&crate::store::durable::Options {
            database_url: "sqlite::memory:".into(),
            database_migrate: true,
            database_max_connections: 1,
        })
        .await
        .unwrap();
        let ephemeral = Arc::new(DashMapEphemeralStore::new());
        let service = RecoveryService::new(ephemeral.clone(), Arc::new(durable));

        let session = session_with(participant("p1", 0));
        service.mirror(&session).await;

        let far_future = grace_window_millis() + 60_000;
        let outcome = service.attempt_recovery("s1", "p1", far_future).await;
        assert!(matches!(outcome, RecoveryOutcome::NotRecoverable));
    }

    #[tokio::test]
    async fn refuses_recovery_for_banned_participant() {
        let durable = connect_durable(&crate::store::durable::Options {
            database_url: "sqlite::memory:".into(),
            database_migrate: true,
            database_max_connections: 1,
        })
        .await
        .unwrap();
        durable.ban_participant("s1", "p1").await.unwrap();
        let ephemeral = Arc::new(DashMapEphemeralStore::new());
        let service = RecoveryService::new(ephemeral.clone(), Arc::new(durable));

        let outcome = service.attempt_recovery("s1", "p1", 1_000).await;
        assert!(matches!(outcome, RecoveryOutcome::Banned));
    }

    /// §8 scenario 5: a snapshot after ephemeral eviction still reports the
    /// participant's authoritative score and active status.
    #[test]
    fn snapshot_reports_authoritative_score_and_rank() {
        let mut p = participant("p1", 0);
        p.score = 250;
        p.connected = true;
        let session = session_with(p);
        let snapshot = build_snapshot(&session, "p1", 0).unwrap();
        assert_eq!(snapshot.total_score, 250);
        assert_eq!(snapshot.rank, Some(1));
        assert!(!snapshot.is_eliminated);
    }

    #[test]
    fn snapshot_is_none_for_unknown_participant() {
        let session = session_with(participant("p1", 0));
        assert!(build_snapshot(&session, "nobody", 0).is_none());
    }
}
