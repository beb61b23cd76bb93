//! §6 External interfaces: inbound client events and outbound server events,
//! as the tagged enums that travel over the WebSocket connection.

use crate::errors::AppErrorCode;
use crate::model::{LeaderboardEntry, PublicQuestion, QuestionId, SessionPhase};
use crate::token::Role;
use serde::{Deserialize, Serialize};

/// The first frame every connection must send, within
/// `constants::AUTH_HANDSHAKE_TIMEOUT` (§4.8). A previously-issued bearer
/// `token` authenticates a host/bigscreen connection or a participant's own
/// reconnect; a bare `nickname` is how a participant joins for the first
/// time, since nobody can hold a token for an identity that doesn't exist
/// yet. Exactly one of the two is expected to be set.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatePayload {
    pub token: Option<String>,
    pub nickname: Option<String>,
}

/// §6 `reconnect_session`: a disconnected participant's own path back in,
/// distinct from the handshake a fresh connection performs.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectPayload {
    pub session_id: String,
    pub participant_id: String,
    pub last_known_question_id: Option<QuestionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerPayload {
    pub question_id: QuestionId,
    pub response: Vec<String>,
    /// Client-reported submission time, used only for display/telemetry;
    /// the server's own receipt time is authoritative for scoring (§4.2).
    pub client_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KickPayload {
    pub participant_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoidQuestionPayload {
    pub question_id: QuestionId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkipQuestionPayload {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetTimerPayload {
    pub new_time_limit_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleLateJoinersPayload {
    pub allow_late_joiners: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FocusLostPayload {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FocusRegainedPayload {
    pub timestamp: i64,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Authenticate(AuthenticatePayload),
    ReconnectSession(ReconnectPayload),
    StartSession,
    AdvanceQuestion,
    LockQuestion,
    ShowResults,
    EndSession,
    SubmitAnswer(SubmitAnswerPayload),
    KickParticipant(KickPayload),
    BanParticipant(KickPayload),
    VoidQuestion(VoidQuestionPayload),
    SkipQuestion(SkipQuestionPayload),
    PauseTimer,
    ResumeTimer,
    ResetTimer(ResetTimerPayload),
    ToggleLateJoiners(ToggleLateJoinersPayload),
    FocusLost(FocusLostPayload),
    FocusRegained(FocusRegainedPayload),
    Ping,
}

#[derive(Debug, Clone, Serialize)]
pub struct Welcome {
    pub session_id: String,
    pub role: Role,
    pub phase: SessionPhase,
    pub server_time: i64,
    /// The bearer token to present on reconnect, set only the moment a
    /// participant identity is first minted; everyone else already holds
    /// the token they authenticated with (§4.8).
    pub participant_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizStarted {
    pub total_questions: usize,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionStarted {
    pub question: PublicQuestion,
    pub question_index: usize,
    pub total_questions: usize,
    pub timer_end_time: i64,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerTick {
    pub question_id: QuestionId,
    pub remaining_ms: i64,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerExpired {
    pub question_id: QuestionId,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionLocked {
    pub question_id: QuestionId,
    pub server_time: i64,
}

/// §4.3 step 10, first emission to the submitter: acknowledges receipt
/// before scoring is known.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerAccepted {
    pub question_id: QuestionId,
    pub response_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerRejected {
    pub question_id: Option<QuestionId>,
    pub reason: AppErrorCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub question_id: QuestionId,
    pub correct: bool,
    pub points_awarded: i64,
    pub speed_bonus: i64,
    pub streak_bonus: i64,
}

/// Broadcast to every role after any submission, carrying only the tally,
/// never the identity of who has answered (§4.3 step 10).
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCountUpdated {
    pub question_id: QuestionId,
    pub answered_count: usize,
    pub participant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreUpdated {
    pub participant_id: String,
    pub total_score: i64,
    pub streak_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardUpdated {
    pub sequence: u64,
    pub entries: Vec<LeaderboardEntry>,
}

/// Per-question correct-answer reveal (§6 `reveal_answers`).
#[derive(Debug, Clone, Serialize)]
pub struct RevealAnswers {
    pub question_id: QuestionId,
    pub correct_options: Vec<String>,
    pub explanation_text: Option<String>,
    /// Set when this reveal was produced by `skip_question` under an exam
    /// policy that still wants statistics broadcast but asks the host UI
    /// not to highlight the correct answer (§9 Open Question a).
    pub exam_mode_skip_reveal: bool,
    pub statistics: QuestionStatistics,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionStatistics {
    pub answered_count: usize,
    pub correct_count: usize,
    pub participant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantJoined {
    pub participant_id: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantLeft {
    pub participant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantKicked {
    pub participant_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantBanned {
    pub participant_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantEliminated {
    pub participant_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStatusChanged {
    pub participant_id: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantFocusChanged {
    pub participant_id: String,
    pub focus_lost_count: u32,
    pub total_lost_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionVoided {
    pub question_id: QuestionId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidQuestionAck {
    pub question_id: QuestionId,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionSkipped {
    pub question_id: QuestionId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    pub final_leaderboard: Vec<LeaderboardEntry>,
}

/// §4.7 RecoveryService snapshot, delivered as `session_recovered`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecovered {
    pub phase: SessionPhase,
    pub current_question: Option<PublicQuestion>,
    pub remaining_ms: i64,
    pub total_score: i64,
    pub rank: Option<u32>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub streak_count: u32,
    pub is_eliminated: bool,
    pub is_spectator: bool,
    pub has_answered_current_question: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryFailed {
    pub reason: AppErrorCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitExceeded {
    pub scope: String,
    pub retry_after_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: AppErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Welcome(Welcome),
    AuthError(ErrorPayload),
    LobbyState(LeaderboardUpdated),
    QuizStarted(QuizStarted),
    QuestionStarted(QuestionStarted),
    TimerTick(TimerTick),
    TimerExpired(TimerExpired),
    QuestionLocked(QuestionLocked),
    RevealAnswers(RevealAnswers),
    AnswerAccepted(AnswerAccepted),
    AnswerRejected(AnswerRejected),
    AnswerResult(AnswerResult),
    AnswerCountUpdated(AnswerCountUpdated),
    ScoreUpdated(ScoreUpdated),
    LeaderboardUpdated(LeaderboardUpdated),
    ParticipantJoined(ParticipantJoined),
    ParticipantLeft(ParticipantLeft),
    ParticipantKicked(ParticipantKicked),
    ParticipantBanned(ParticipantBanned),
    ParticipantEliminated(ParticipantEliminated),
    ParticipantStatusChanged(ParticipantStatusChanged),
    ParticipantFocusChanged(ParticipantFocusChanged),
    QuestionVoided(QuestionVoided),
    VoidQuestionAck(VoidQuestionAck),
    QuestionSkipped(QuestionSkipped),
    SessionEnded(SessionEnded),
    SessionRecovered(SessionRecovered),
    RecoveryFailed(RecoveryFailed),
    RateLimitExceeded(RateLimitExceeded),
    Pong,
    Error(ErrorPayload),
}

impl OutboundEvent {
    pub fn error(code: AppErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }
}
