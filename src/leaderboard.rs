//! C10 Leaderboard: ranking and broadcast coalescing (§4.5).
//!
//! Grounded on the quiz-slide example's throttled `LiveboardRepo` (a rate
//! limiter guarding how often a derived view recomputes and is pushed to
//! clients), adapted to this system's tie-break rule: score desc, then
//! total time ascending, then participant id ascending so every tie
//! resolves to the same order on every replica.

use crate::constants::{LEADERBOARD_COALESCE_INTERVAL, LEADERBOARD_DEFAULT_TOP_N};
use crate::model::{LeaderboardEntry, Participant, Session};
use tokio::time::Instant;

pub struct Leaderboard {
    sequence: u64,
    last_broadcast_at: Option<Instant>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            last_broadcast_at: None,
        }
    }

    /// Whether enough time has passed since the last broadcast to send
    /// another one. Callers should still send immediately on events that
    /// the coalescing window should never delay (e.g. `question_locked`);
    /// this only governs the steady drizzle of mid-question updates.
    pub fn should_broadcast(&self, now: Instant) -> bool {
        match self.last_broadcast_at {
            None => true,
            Some(last) => now.duration_since(last) >= LEADERBOARD_COALESCE_INTERVAL,
        }
    }

    /// Builds the next broadcast snapshot, bumping the sequence number so
    /// clients can detect and discard stale or out-of-order deliveries.
    pub fn snapshot(&mut self, session: &Session, now: Instant, top_n: Option<usize>) -> (u64, Vec<LeaderboardEntry>) {
        self.sequence += 1;
        self.last_broadcast_at = Some(now);
        (self.sequence, ranked_entries(session, top_n.unwrap_or(LEADERBOARD_DEFAULT_TOP_N)))
    }
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ranked_entries(session: &Session, top_n: usize) -> Vec<LeaderboardEntry> {
    let mut participants: Vec<&Participant> = session.participants.values().collect();
    participants.sort_by(ordering_key);

    participants
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(idx, p)| LeaderboardEntry {
            participant_id: p.id.clone(),
            nickname: p.nickname.clone(),
            score: p.score,
            total_time_ms: p.total_time_ms,
            streak_count: p.current_streak,
            last_question_score: last_question_score(session, &p.id),
            rank: (idx + 1) as u32,
        })
        .collect()
}

/// `pointsAwarded` of `participant_id`'s most recently scored, non-voided
/// answer, or `0` if they haven't answered anything yet (§3 leaderboard
/// entry shape).
fn last_question_score(session: &Session, participant_id: &str) -> i64 {
    session
        .answers
        .iter()
        .filter(|a| a.participant_id == participant_id && !a.voided)
        .max_by_key(|a| a.answered_at_millis)
        .map_or(0, |a| a.points_awarded)
}

/// 1-based rank of a single participant, computed over the full ordering
/// rather than a possibly-truncated top-N (§4.5 `getRank`).
pub fn rank_of(session: &Session, participant_id: &str) -> Option<u32> {
    let mut participants: Vec<&Participant> = session.participants.values().collect();
    participants.sort_by(ordering_key);
    participants
        .iter()
        .position(|p| p.id == participant_id)
        .map(|idx| (idx + 1) as u32)
}

fn ordering_key(a: &&Participant, b: &&Participant) -> std::cmp::Ordering {
    b.score
        .cmp(&a.score)
        .then(a.total_time_ms.cmp(&b.total_time_ms))
        .then(a.id.cmp(&b.id))
}
