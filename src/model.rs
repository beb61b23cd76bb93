//! §3 Data model: `Session`, `Participant`, `Question`, `Answer`, and the
//! leaderboard entry shape, plus the invariants (I1-I5) expressed as the
//! types that make the violating states unrepresentable where practical.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type SessionId = String;
pub type ParticipantId = String;
pub type QuestionId = String;

/// §4.1 SessionCoordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Lobby,
    QuestionActive,
    QuestionLocked,
    QuestionResults,
    Intermission,
    Ended,
}

impl SessionPhase {
    /// I2: only these transitions are legal. `self -> self` is never legal;
    /// callers must not invoke a transition unless the phase actually
    /// changes.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Lobby, QuestionActive)
                | (QuestionActive, QuestionLocked)
                | (QuestionLocked, QuestionResults)
                | (QuestionResults, QuestionActive)
                | (QuestionResults, Intermission)
                | (Intermission, QuestionActive)
                | (QuestionResults, Ended)
                | (Intermission, Ended)
                | (Lobby, Ended)
                | (QuestionActive, Ended)
                | (QuestionLocked, Ended)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    TypeAnswer,
    NumberInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub kind: QuestionType,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    /// Correct option ids (single entry for single-choice/true-false,
    /// multiple for multiple-choice) or accepted strings for type-answer.
    pub correct: Vec<String>,
    pub base_points: i64,
    pub time_limit_ms: i64,
    /// Fraction of `base_points` awarded as a speed bonus to an instant,
    /// correct answer, decaying linearly to zero at the time limit (§4.4).
    pub speed_bonus_multiplier: f64,
    /// Whether a `MultipleChoice` question awards proportional credit for a
    /// partially-correct selection, or is all-or-nothing like every other
    /// question type (§4.4).
    pub partial_credit_enabled: bool,
    pub explanation_text: Option<String>,
    /// A voided question (§4.4, §8 P5) always scores zero regardless of
    /// answer, and is excluded from accuracy statistics (I4).
    pub voided: bool,
    /// `NumberInput` only: the accepted deviation from `correct[0]` parsed
    /// as a float, e.g. `target=100, tolerance=2` accepts `[98, 102]` (§4.4).
    pub tolerance: Option<f64>,
}

/// Client-facing view of a `Question` while it is live: the same shape
/// minus `correct`, so `question_started`/`session_recovered` payloads never
/// leak the answer key before `reveal_answers` (§4.1, §4.7).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub kind: QuestionType,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub base_points: i64,
    pub time_limit_ms: i64,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            kind: question.kind,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            base_points: question.base_points,
            time_limit_ms: question.time_limit_ms,
        }
    }
}

/// §3 `examSettings`: per-session scoring/monitoring policy toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExamSettings {
    pub negative_marking_enabled: bool,
    /// Percentage of `base_points` deducted for an incorrect answer when
    /// negative marking is enabled, e.g. `25` deducts a quarter of the
    /// question's base points (§4.4).
    pub negative_marking_percentage: u32,
    /// Advisory only: the server never scores focus loss itself (§4.8); a
    /// moderator-defined policy built on `participant_focus_changed` events
    /// may act on it when this is set.
    pub focus_monitoring_enabled: bool,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            negative_marking_enabled: false,
            negative_marking_percentage: 0,
            focus_monitoring_enabled: false,
        }
    }
}

/// §4.8 focus-loss aggregate counters, advisory unless
/// `ExamSettings::focus_monitoring_enabled`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FocusStats {
    pub count: u32,
    pub total_lost_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub nickname: String,
    /// Peer address at join time (§3 `ipAddress`). Used by the ban
    /// enforcement path so a banned participant can't simply rejoin under
    /// a new identity from the same network address.
    pub ip_address: String,
    pub connected: bool,
    pub banned: bool,
    /// Set on ban (permanent, spectator-only, no further state changes) and
    /// left `false` on a plain kick, which only disconnects (§4.8).
    pub is_eliminated: bool,
    /// Wall-clock millis of the last ping/heartbeat seen from this
    /// participant, used by RecoveryService (§4.7) to compute grace windows.
    pub last_seen_millis: i64,
    pub score: i64,
    pub total_time_ms: i64,
    pub current_streak: u32,
    pub focus: FocusStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub participant_id: ParticipantId,
    pub question_id: QuestionId,
    pub response: Vec<String>,
    /// Milliseconds from question start to submission, clamped to the
    /// question's time limit plus grace (§4.3 step 4).
    pub response_time_ms: i64,
    pub points_awarded: i64,
    pub correct: bool,
    /// Server-received wall-clock millis; used to resequence answers by
    /// arrival order when a void (§8 P5) recomputes later participants'
    /// streaks excluding the voided question.
    pub answered_at_millis: i64,
    /// Set by `void_question`; a voided answer's `points_awarded` is
    /// permanently zeroed and it is skipped by streak recomputation and
    /// accuracy statistics (I4, I5).
    pub voided: bool,
}

/// A single row of a `leaderboard_updated` broadcast (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub score: i64,
    pub total_time_ms: i64,
    pub streak_count: u32,
    /// `points_awarded` of this participant's most recently scored answer,
    /// or `0` before they have answered anything (§3).
    pub last_question_score: i64,
    pub rank: u32,
}

/// I1: a session's participants are keyed uniquely by id, and nickname
/// uniqueness within a session is enforced by the registry at join time,
/// not by this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub join_code: String,
    pub host_subject: String,
    pub phase: SessionPhase,
    pub questions: Vec<Question>,
    pub current_question_index: Option<usize>,
    pub participants: HashMap<ParticipantId, Participant>,
    /// All answers submitted so far, for audit/recovery and for re-deriving
    /// the leaderboard after a crash (§4.7).
    pub answers: Vec<Answer>,
    /// Whether a join after `Lobby` is admitted as a late joiner (§4.1).
    /// Toggleable by the controller mid-session.
    pub allow_late_joiners: bool,
    pub exam_settings: ExamSettings,
    pub created_at_millis: i64,
    /// I4: once a session enters `Ended`, it is immutable; no further writes
    /// to this struct are legal.
    pub ended_at_millis: Option<i64>,
}

impl Session {
    pub fn current_question(&self) -> Option<&Question> {
        self.current_question_index
            .and_then(|idx| self.questions.get(idx))
    }

    pub fn question_by_id(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// I3: an answer exists for a (participant, question) pair at most once.
    pub fn has_answered(&self, participant_id: &str, question_id: &str) -> bool {
        self.answers
            .iter()
            .any(|a| a.participant_id == participant_id && a.question_id == question_id)
    }
}
