//! The per-session actor: owns a `Session`, processes one message at a
//! time from its inbox, and is the only thing ever allowed to mutate that
//! session's state (§5, §4.1). Grounded on the teacher's pattern of a
//! single `tokio::spawn`ed background loop owning shared state behind a
//! lock (`clear_lobby_on_interval` + `SharedLobbyState`), generalized from
//! one lock shared by every session to one actor per session so no
//! request for session A ever waits on session B.

use crate::answer_pipeline::process_submission;
use crate::clock::SharedClock;
use crate::constants::{AUDIT_IO_DEADLINE, DURABLE_IO_DEADLINE};
use crate::errors::{AppError, AppErrorCode};
use crate::events::{
    AnswerAccepted, AnswerCountUpdated, AnswerRejected, AnswerResult, InboundEvent,
    LeaderboardUpdated, OutboundEvent, ParticipantBanned, ParticipantFocusChanged,
    ParticipantJoined, ParticipantKicked, ParticipantLeft, QuestionLocked, QuestionSkipped,
    QuestionStarted, QuestionStatistics, QuestionVoided, QuizStarted, RateLimitExceeded,
    RevealAnswers, ScoreUpdated, SessionEnded, TimerExpired, TimerTick, VoidQuestionAck, Welcome,
};
use crate::fanout::{ConnectionId, FanOut};
use crate::leaderboard::{ranked_entries, Leaderboard};
use crate::model::{ExamSettings, Participant, PublicQuestion, Question, Session, SessionPhase};
use crate::profanity::ProfanityFilter;
use crate::rate_limiter::{Bucket, RateLimiter};
use crate::recovery::{build_snapshot, RecoveryOutcome, RecoveryService};
use crate::registry::SharedRegistry;
use crate::store::{call_with_deadline, AuditLog, DurableStore};
use crate::timer::{Timer, TimerEvent};
use crate::token::{Role, TokenIssuer};
use crate::util::nickname_length_valid;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub join_code: String,
    pub inbox: mpsc::Sender<CoordinatorMessage>,
}

pub struct ConnectRequest {
    pub role: Role,
    /// The authenticated subject from the bearer token: a participant id
    /// for `Participant`/`Tester` reconnecting, or the host subject for
    /// `Controller`/`Bigscreen`. `None` for a participant joining fresh.
    pub subject: Option<String>,
    pub nickname: Option<String>,
    /// The peer address of the inbound connection, used as the join
    /// rate-limit key (§4.6) so one client can't farm fresh nicknames
    /// faster than one banned nickname can.
    pub client_addr: Option<String>,
    pub outbound: mpsc::Sender<OutboundEvent>,
}

pub enum CoordinatorMessage {
    Connect {
        request: ConnectRequest,
        reply: oneshot::Sender<Result<(ConnectionId, String), AppError>>,
    },
    Inbound {
        connection_id: ConnectionId,
        event: InboundEvent,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    session_id: String,
    join_code: String,
    host_subject: String,
    questions: Vec<Question>,
    exam_settings: ExamSettings,
    allow_late_joiners: bool,
    clock: SharedClock,
    durable: Arc<dyn DurableStore>,
    audit: Arc<dyn AuditLog>,
    rate_limiter: Arc<RateLimiter>,
    registry: SharedRegistry,
    tokens: Arc<TokenIssuer>,
    created_at_millis: i64,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(256);

    let session = Session {
        id: session_id.clone(),
        join_code: join_code.clone(),
        host_subject,
        phase: SessionPhase::Lobby,
        questions,
        current_question_index: None,
        participants: Default::default(),
        answers: vec![],
        allow_late_joiners,
        exam_settings,
        created_at_millis,
        ended_at_millis: None,
    };

    let recovery = RecoveryService::new(
        Arc::new(crate::store::ephemeral::DashMapEphemeralStore::new()),
        durable.clone(),
    );

    let actor = SessionActor {
        session,
        fanout: FanOut::new(),
        timer: None,
        leaderboard: Leaderboard::new(),
        clock,
        durable,
        audit,
        recovery,
        rate_limiter,
        registry,
        tokens,
        profanity: ProfanityFilter::new(),
        inbox: rx,
        question_started_at_millis: None,
    };

    tokio::spawn(actor.run());

    SessionHandle {
        session_id,
        join_code,
        inbox: tx,
    }
}

struct SessionActor {
    session: Session,
    fanout: FanOut,
    timer: Option<Timer>,
    leaderboard: Leaderboard,
    clock: SharedClock,
    durable: Arc<dyn DurableStore>,
    audit: Arc<dyn AuditLog>,
    recovery: RecoveryService,
    rate_limiter: Arc<RateLimiter>,
    registry: SharedRegistry,
    tokens: Arc<TokenIssuer>,
    profanity: ProfanityFilter,
    inbox: mpsc::Receiver<CoordinatorMessage>,
    question_started_at_millis: Option<i64>,
}

impl SessionActor {
    async fn run(mut self) {
        // Persist immediately so a freshly created session is visible to
        // `DurableStore` readers (e.g. `GET /sessions/:id/info`) even before
        // its first participant connects.
        self.persist().await;

        loop {
            let wake = self.timer.as_ref().and_then(Timer::next_wake);

            tokio::select! {
                msg = self.inbox.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }
                _ = sleep_until_option(wake) => {
                    self.handle_timer_wake().await;
                }
            }

            if self.session.phase == SessionPhase::Ended && self.inbox.is_empty() {
                break;
            }
        }

        // Only the live routing entry is dropped here; the durable record
        // (written by `end_session`'s `persist()`) remains the session's
        // permanent history.
        self.registry.remove(&self.session.id, &self.session.join_code);
    }

    async fn handle_message(&mut self, msg: CoordinatorMessage) {
        match msg {
            CoordinatorMessage::Connect { request, reply } => {
                let result = self.handle_connect(request).await;
                let _ = reply.send(result);
            }
            CoordinatorMessage::Inbound { connection_id, event } => {
                self.handle_inbound(connection_id, event).await;
            }
            CoordinatorMessage::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id).await;
            }
        }
    }

    async fn handle_connect(&mut self, request: ConnectRequest) -> Result<(ConnectionId, String), AppError> {
        match request.role {
            Role::Participant => self.connect_participant(request).await,
            Role::Tester => self.connect_participant(request).await,
            Role::Controller | Role::Bigscreen => {
                if request.subject.as_deref() != Some(self.session.host_subject.as_str()) {
                    return Err(AppError::new(AppErrorCode::Unauthorized));
                }
                let connection_id =
                    self.fanout
                        .register(request.role, self.session.host_subject.clone(), request.outbound.clone());
                self.send_welcome(connection_id, None).await;
                Ok((connection_id, self.session.host_subject.clone()))
            }
        }
    }

    async fn connect_participant(&mut self, request: ConnectRequest) -> Result<(ConnectionId, String), AppError> {
        if let Some(participant_id) = &request.subject {
            if self.durable.is_banned(&self.session.id, participant_id).await.unwrap_or(false) {
                return Err(AppError::new(AppErrorCode::ParticipantBanned));
            }

            if self.session.participants.contains_key(participant_id) {
                let connection_id = self.fanout.register(request.role, participant_id.clone(), request.outbound.clone());
                self.mark_connected(participant_id, true);
                self.send_welcome(connection_id, None).await;
                self.send_recovery_snapshot(connection_id, participant_id).await;
                self.fanout
                    .broadcast(OutboundEvent::ParticipantStatusChanged(
                        crate::events::ParticipantStatusChanged {
                            participant_id: participant_id.clone(),
                            connected: true,
                        },
                    ))
                    .await;
                return Ok((connection_id, participant_id.clone()));
            }

            match self
                .recovery
                .attempt_recovery(&self.session.id, participant_id, self.clock.now_millis())
                .await
            {
                RecoveryOutcome::Banned => return Err(AppError::new(AppErrorCode::ParticipantBanned)),
                RecoveryOutcome::Recovered(participant) => {
                    self.session.participants.insert(participant.id.clone(), participant);
                    let connection_id = self.fanout.register(request.role, participant_id.clone(), request.outbound.clone());
                    self.mark_connected(participant_id, true);
                    self.send_welcome(connection_id, None).await;
                    self.send_recovery_snapshot(connection_id, participant_id).await;
                    return Ok((connection_id, participant_id.clone()));
                }
                RecoveryOutcome::NotRecoverable => {
                    return Err(AppError::new(AppErrorCode::SessionExpired));
                }
            }
        }

        if self.session.phase == SessionPhase::Ended {
            return Err(AppError::new(AppErrorCode::SessionEnded));
        }
        if self.session.phase != SessionPhase::Lobby && !self.session.allow_late_joiners {
            return Err(AppError::new(AppErrorCode::SessionStarted));
        }

        if let Some(ip) = &request.client_addr {
            if self.durable.is_ip_banned(&self.session.id, ip).await.unwrap_or(false) {
                return Err(AppError::new(AppErrorCode::ParticipantBanned));
            }
        }

        let nickname = request.nickname.unwrap_or_default();
        let rate_limit_key = request.client_addr.clone().unwrap_or_else(|| nickname.clone());
        if !self.rate_limiter.check(Bucket::Join, &rate_limit_key).await {
            return Err(AppError::new(AppErrorCode::RateLimited));
        }
        if !nickname_length_valid(&nickname) {
            return Err(AppError::new(AppErrorCode::Invalid));
        }
        if !self.profanity.is_allowed(&nickname) {
            return Err(AppError::new(AppErrorCode::ProfanityDetected));
        }
        if self
            .session
            .participants
            .values()
            .any(|p| p.nickname.eq_ignore_ascii_case(&nickname))
        {
            return Err(AppError::new(AppErrorCode::NicknameTaken));
        }

        let participant_id = uuid::Uuid::new_v4().to_string();
        let participant = Participant {
            id: participant_id.clone(),
            nickname: nickname.clone(),
            ip_address: request.client_addr.clone().unwrap_or_default(),
            connected: true,
            banned: false,
            is_eliminated: false,
            last_seen_millis: self.clock.now_millis(),
            score: 0,
            total_time_ms: 0,
            current_streak: 0,
            focus: Default::default(),
        };
        self.session.participants.insert(participant_id.clone(), participant);

        let connection_id = self.fanout.register(request.role, participant_id.clone(), request.outbound.clone());
        let participant_token = self.issue_participant_token(&participant_id);
        self.send_welcome(connection_id, participant_token).await;
        self.fanout
            .broadcast(OutboundEvent::ParticipantJoined(ParticipantJoined {
                participant_id: participant_id.clone(),
                nickname,
            }))
            .await;

        if self.session.phase == SessionPhase::Lobby {
            let (sequence, entries) = self.leaderboard.snapshot(&self.session, self.clock.now(), None);
            self.fanout
                .broadcast(OutboundEvent::LobbyState(LeaderboardUpdated { sequence, entries }))
                .await;
        } else {
            // A late joiner needs the current question/leaderboard state
            // immediately, the same catch-up a reconnecting participant gets.
            self.send_recovery_snapshot(connection_id, &participant_id).await;
        }

        self.persist().await;

        Ok((connection_id, participant_id))
    }

    fn mark_connected(&mut self, participant_id: &str, connected: bool) {
        if let Some(participant) = self.session.participants.get_mut(participant_id) {
            participant.connected = connected;
            participant.last_seen_millis = self.clock.now_millis();
        }
    }

    async fn send_welcome(&self, connection_id: ConnectionId, participant_token: Option<String>) {
        self.fanout
            .send_to(
                connection_id,
                OutboundEvent::Welcome(Welcome {
                    session_id: self.session.id.clone(),
                    role: self.fanout.connection(connection_id).map(|c| c.role).unwrap_or(Role::Participant),
                    phase: self.session.phase,
                    server_time: self.clock.now_millis(),
                    participant_token,
                }),
            )
            .await;
    }

    /// Mints the bearer token a freshly-joined participant needs to
    /// reconnect later (§4.8); logged and omitted rather than failing the
    /// join outright, since a join without a reconnect token still succeeds,
    /// it just can't survive a disconnect.
    fn issue_participant_token(&self, participant_id: &str) -> Option<String> {
        match self.tokens.issue(
            &self.session.id,
            Role::Participant,
            participant_id,
            self.clock.now_millis(),
            crate::constants::PARTICIPANT_TOKEN_TTL.as_millis() as i64,
        ) {
            Ok(token) => Some(token),
            Err(error) => {
                warn!(session_id = %self.session.id, participant_id, ?error, "failed to issue participant token");
                None
            }
        }
    }

    /// Delivers the same `session_recovered` snapshot a reconnecting
    /// participant gets (§4.7) to any participant who joins or rejoins
    /// after the lobby, so a late joiner or a freshly-reconnected client
    /// never has to guess the session's current state from subsequent
    /// broadcasts alone.
    async fn send_recovery_snapshot(&self, connection_id: ConnectionId, participant_id: &str) {
        if self.session.phase == SessionPhase::Lobby {
            return;
        }
        let remaining_ms = self.timer.as_ref().map(Timer::remaining_ms).unwrap_or(0);
        if let Some(snapshot) = build_snapshot(&self.session, participant_id, remaining_ms) {
            self.fanout.send_to(connection_id, OutboundEvent::SessionRecovered(snapshot)).await;
        }
    }

    async fn handle_inbound(&mut self, connection_id: ConnectionId, event: InboundEvent) {
        let Some(connection) = self.fanout.connection(connection_id) else {
            return;
        };
        let role = connection.role;
        let subject = connection.subject.clone();

        if !self.rate_limiter.check(Bucket::Message, &subject).await {
            self.fanout
                .send_to(
                    connection_id,
                    OutboundEvent::RateLimitExceeded(RateLimitExceeded {
                        scope: "message".into(),
                        retry_after_ms: Bucket::Message.window_millis(),
                    }),
                )
                .await;
            return;
        }

        match event {
            InboundEvent::Ping => {
                self.mark_connected(&subject, true);
                self.fanout.send_to(connection_id, OutboundEvent::Pong).await;
            }
            InboundEvent::ReconnectSession(payload) if matches!(role, Role::Participant | Role::Tester) => {
                self.handle_reconnect_request(connection_id, &subject, payload).await;
            }
            InboundEvent::StartSession if role == Role::Controller => {
                let ok = self.start_session().await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::AdvanceQuestion if role == Role::Controller => {
                let ok = self.advance_question().await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::LockQuestion if role == Role::Controller => {
                let ok = self.lock_current_question().await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::ShowResults if role == Role::Controller => {
                let ok = self.show_results().await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::EndSession if role == Role::Controller => self.end_session().await,
            InboundEvent::KickParticipant(payload) if role == Role::Controller => {
                self.remove_participant(&payload.participant_id, false, payload.reason).await;
            }
            InboundEvent::BanParticipant(payload) if role == Role::Controller => {
                self.remove_participant(&payload.participant_id, true, payload.reason).await;
            }
            InboundEvent::VoidQuestion(payload) if role == Role::Controller => {
                self.void_question(connection_id, payload).await;
            }
            InboundEvent::SkipQuestion(payload) if role == Role::Controller => {
                let ok = self.skip_question(payload).await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::PauseTimer if role == Role::Controller => {
                if let Some(timer) = self.timer.as_mut() {
                    timer.pause();
                }
            }
            InboundEvent::ResumeTimer if role == Role::Controller => {
                if let Some(timer) = self.timer.as_mut() {
                    timer.resume();
                }
            }
            InboundEvent::ResetTimer(payload) if role == Role::Controller => {
                let ok = self.reset_timer(payload.new_time_limit_ms).await;
                self.reject_unless(connection_id, ok).await;
            }
            InboundEvent::ToggleLateJoiners(payload) if role == Role::Controller => {
                self.session.allow_late_joiners = payload.allow_late_joiners;
                self.persist().await;
            }
            InboundEvent::SubmitAnswer(payload) if matches!(role, Role::Participant | Role::Tester) => {
                self.submit_answer(connection_id, &subject, payload).await;
            }
            InboundEvent::FocusLost(_) if matches!(role, Role::Participant | Role::Tester) => {
                if let Some(participant) = self.session.participants.get_mut(&subject) {
                    participant.focus.count += 1;
                }
                self.broadcast_focus_changed(&subject).await;
            }
            InboundEvent::FocusRegained(payload) if matches!(role, Role::Participant | Role::Tester) => {
                if let Some(participant) = self.session.participants.get_mut(&subject) {
                    participant.focus.total_lost_time_ms += payload.duration_ms.max(0);
                }
                self.broadcast_focus_changed(&subject).await;
            }
            _ => {
                self.fanout
                    .send_to(connection_id, OutboundEvent::error(AppErrorCode::Unauthorized, "not permitted"))
                    .await;
            }
        }
    }

    async fn handle_reconnect_request(
        &mut self,
        connection_id: ConnectionId,
        subject: &str,
        payload: crate::events::ReconnectPayload,
    ) {
        if payload.session_id != self.session.id || payload.participant_id != subject {
            self.fanout
                .send_to(
                    connection_id,
                    OutboundEvent::RecoveryFailed(crate::events::RecoveryFailed {
                        reason: AppErrorCode::Unauthorized,
                    }),
                )
                .await;
            return;
        }
        let remaining_ms = self.timer.as_ref().map(Timer::remaining_ms).unwrap_or(0);
        match build_snapshot(&self.session, subject, remaining_ms) {
            Some(snapshot) => self.fanout.send_to(connection_id, OutboundEvent::SessionRecovered(snapshot)).await,
            None => {
                self.fanout
                    .send_to(
                        connection_id,
                        OutboundEvent::RecoveryFailed(crate::events::RecoveryFailed {
                            reason: AppErrorCode::ParticipantNotFound,
                        }),
                    )
                    .await
            }
        }
    }

    async fn broadcast_focus_changed(&mut self, participant_id: &str) {
        if let Some(participant) = self.session.participants.get(participant_id) {
            self.fanout
                .broadcast(OutboundEvent::ParticipantFocusChanged(ParticipantFocusChanged {
                    participant_id: participant_id.to_owned(),
                    focus_lost_count: participant.focus.count,
                    total_lost_time_ms: participant.focus.total_lost_time_ms,
                }))
                .await;
        }
    }

    async fn submit_answer(&mut self, connection_id: ConnectionId, participant_id: &str, payload: crate::events::SubmitAnswerPayload) {
        // The answer bucket's cap of 1 is this pipeline's dedup guard
        // (§4.3 step 5, §4.6): a denial here means a scored answer for
        // this (participant, question) already exists, so it is reported
        // as ALREADY_SUBMITTED rather than RATE_LIMITED — the pipeline's
        // own `has_answered` check (step 3) only fires for a submission
        // that slips past this guard within the same window.
        if !self.rate_limiter.check_answer(participant_id, &payload.question_id).await {
            self.fanout
                .send_to(
                    connection_id,
                    OutboundEvent::AnswerRejected(AnswerRejected {
                        question_id: Some(payload.question_id.clone()),
                        reason: AppErrorCode::AlreadySubmitted,
                    }),
                )
                .await;
            return;
        }

        let question_started_at = self
            .question_started_at_millis
            .unwrap_or_else(|| self.clock.now_millis());
        let now = self.clock.now_millis();

        let outcome = match process_submission(&self.session, participant_id, &payload, serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(0), now, question_started_at) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.fanout
                    .send_to(
                        connection_id,
                        OutboundEvent::AnswerRejected(AnswerRejected {
                            question_id: Some(payload.question_id.clone()),
                            reason: error.code,
                        }),
                    )
                    .await;
                return;
            }
        };

        self.fanout
            .send_to(
                connection_id,
                OutboundEvent::AnswerAccepted(AnswerAccepted {
                    question_id: outcome.answer.question_id.clone(),
                    response_time_ms: outcome.answer.response_time_ms,
                }),
            )
            .await;

        if let Some(participant) = self.session.participants.get_mut(participant_id) {
            participant.score += outcome.answer.points_awarded;
            participant.total_time_ms += outcome.answer.response_time_ms;
            participant.current_streak = outcome.new_streak;
        }

        self.fanout
            .send_to(
                connection_id,
                OutboundEvent::AnswerResult(AnswerResult {
                    question_id: outcome.answer.question_id.clone(),
                    correct: outcome.answer.correct,
                    points_awarded: outcome.answer.points_awarded,
                    speed_bonus: outcome.speed_bonus,
                    streak_bonus: outcome.streak_bonus,
                }),
            )
            .await;

        if let Some(participant) = self.session.participants.get(participant_id) {
            self.fanout
                .broadcast(OutboundEvent::ScoreUpdated(ScoreUpdated {
                    participant_id: participant_id.to_owned(),
                    total_score: participant.score,
                    streak_count: participant.current_streak,
                }))
                .await;
        }

        let question_id = outcome.answer.question_id.clone();
        self.session.answers.push(outcome.answer);

        let answered_count = self
            .session
            .answers
            .iter()
            .filter(|a| a.question_id == question_id && !a.voided)
            .count();
        self.fanout
            .broadcast(OutboundEvent::AnswerCountUpdated(AnswerCountUpdated {
                question_id,
                answered_count,
                participant_count: self.session.participants.len(),
            }))
            .await;

        self.maybe_broadcast_leaderboard(true).await;
        self.persist().await;
    }

    async fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if let Some(connection) = self.fanout.connection(connection_id) {
            let subject = connection.subject.clone();
            self.fanout.unregister(connection_id);
            if !self.fanout.is_connected(&subject) {
                self.mark_connected(&subject, false);
                self.fanout
                    .broadcast(OutboundEvent::ParticipantLeft(ParticipantLeft { participant_id: subject }))
                    .await;
            }
        }
    }

    /// A kick disconnects but leaves the participant's record intact so
    /// they can rejoin with the same token; a ban marks them eliminated
    /// (spectator, no further reconnection) without erasing their history
    /// from the leaderboard (§4.8).
    async fn remove_participant(&mut self, participant_id: &str, ban: bool, reason: Option<String>) {
        for connection_id in self.fanout.connection_ids_for_subject(participant_id) {
            self.fanout.unregister(connection_id);
        }

        if ban {
            let ip_address = self
                .session
                .participants
                .get(participant_id)
                .map(|participant| participant.ip_address.clone());
            self.persist_ban_with_retry(participant_id, ip_address);
            self.record_audit_with_retry("participant_banned", json!({ "participant_id": participant_id }));
            if let Some(participant) = self.session.participants.get_mut(participant_id) {
                participant.is_eliminated = true;
                participant.banned = true;
                participant.connected = false;
            }
            self.fanout
                .broadcast(OutboundEvent::ParticipantBanned(ParticipantBanned {
                    participant_id: participant_id.to_owned(),
                    reason,
                }))
                .await;
            self.fanout
                .broadcast(OutboundEvent::ParticipantEliminated(crate::events::ParticipantEliminated {
                    participant_id: participant_id.to_owned(),
                }))
                .await;
        } else {
            self.mark_connected(participant_id, false);
            self.fanout
                .broadcast(OutboundEvent::ParticipantKicked(ParticipantKicked {
                    participant_id: participant_id.to_owned(),
                    reason,
                }))
                .await;
        }

        self.persist().await;
    }

    /// Sends `error { code: INVALID }` to the controller that issued a
    /// command an out-of-state guard rejected (P2: rejected without
    /// mutating state, but the client must still observe the rejection).
    async fn reject_unless(&mut self, connection_id: ConnectionId, ok: bool) {
        if !ok {
            self.fanout
                .send_to(connection_id, OutboundEvent::error(AppErrorCode::Invalid, "command not valid in current session state"))
                .await;
        }
    }

    async fn start_session(&mut self) -> bool {
        if !self.session.phase.can_transition_to(SessionPhase::QuestionActive) {
            return false;
        }
        self.session.current_question_index = Some(0);
        self.fanout
            .broadcast(OutboundEvent::QuizStarted(QuizStarted {
                total_questions: self.session.questions.len(),
                server_time: self.clock.now_millis(),
            }))
            .await;
        self.transition_to_active_question().await;
        true
    }

    /// §4.1: `next_question` is only legal from `REVEAL` (`QuestionResults`
    /// here); anywhere else it is a no-op rather than a state mutation (P2).
    async fn advance_question(&mut self) -> bool {
        if self.session.phase != SessionPhase::QuestionResults {
            return false;
        }
        let next_index = self.session.current_question_index.map(|i| i + 1).unwrap_or(0);
        if next_index >= self.session.questions.len() {
            self.end_session().await;
            return true;
        }
        self.session.current_question_index = Some(next_index);
        self.session.phase = SessionPhase::Intermission;
        self.transition_to_active_question().await;
        true
    }

    async fn transition_to_active_question(&mut self) {
        self.session.phase = SessionPhase::QuestionActive;
        let Some(question) = self.session.current_question().cloned() else { return };

        self.question_started_at_millis = Some(self.clock.now_millis());
        self.timer = Some(Timer::start(self.clock.clone(), question.time_limit_ms));

        let total = self.session.questions.len();
        let index = self.session.current_question_index.unwrap_or(0);
        let timer_end_time = self.clock.now_millis() + question.time_limit_ms;
        self.fanout
            .broadcast(OutboundEvent::QuestionStarted(QuestionStarted {
                question: PublicQuestion::from(&question),
                question_index: index,
                total_questions: total,
                timer_end_time,
                server_time: self.clock.now_millis(),
            }))
            .await;
        self.persist().await;
    }

    async fn reset_timer(&mut self, new_time_limit_ms: i64) -> bool {
        if self.session.phase != SessionPhase::QuestionActive {
            return false;
        }
        self.question_started_at_millis = Some(self.clock.now_millis());
        self.timer = Some(Timer::start(self.clock.clone(), new_time_limit_ms));
        true
    }

    async fn lock_current_question(&mut self) -> bool {
        if !self.session.phase.can_transition_to(SessionPhase::QuestionLocked) {
            return false;
        }
        self.session.phase = SessionPhase::QuestionLocked;
        self.timer = None;
        if let Some(question) = self.session.current_question() {
            self.fanout
                .broadcast(OutboundEvent::QuestionLocked(QuestionLocked {
                    question_id: question.id.clone(),
                    server_time: self.clock.now_millis(),
                }))
                .await;
        }
        self.persist().await;
        true
    }

    async fn show_results(&mut self) -> bool {
        if !self.session.phase.can_transition_to(SessionPhase::QuestionResults) {
            return false;
        }
        self.session.phase = SessionPhase::QuestionResults;
        self.reveal_current_question(false).await;
        self.maybe_broadcast_leaderboard(false).await;
        self.persist().await;
        true
    }

    /// Builds and broadcasts the `reveal_answers` event for the current
    /// question (§6). Shared by the normal results transition and by
    /// `skip_question`, which still reveals statistics but flags
    /// `exam_mode_skip_reveal` so the host UI may withhold the correct-
    /// answer highlight (§9 Open Question a).
    async fn reveal_current_question(&mut self, exam_mode_skip_reveal: bool) {
        let Some(question) = self.session.current_question().cloned() else { return };
        let answered_count = self
            .session
            .answers
            .iter()
            .filter(|a| a.question_id == question.id && !a.voided)
            .count();
        let correct_count = self
            .session
            .answers
            .iter()
            .filter(|a| a.question_id == question.id && !a.voided && a.correct)
            .count();

        self.fanout
            .broadcast(OutboundEvent::RevealAnswers(RevealAnswers {
                question_id: question.id.clone(),
                correct_options: question.correct.clone(),
                explanation_text: question.explanation_text.clone(),
                exam_mode_skip_reveal,
                statistics: QuestionStatistics {
                    answered_count,
                    correct_count,
                    participant_count: self.session.participants.len(),
                },
            }))
            .await;
    }

    async fn skip_question(&mut self, payload: crate::events::SkipQuestionPayload) -> bool {
        if !matches!(self.session.phase, SessionPhase::QuestionActive | SessionPhase::QuestionLocked) {
            return false;
        }
        self.timer = None;
        self.session.phase = SessionPhase::QuestionResults;
        let question_id = self.session.current_question().map(|q| q.id.clone()).unwrap_or_default();
        self.reveal_current_question(true).await;
        self.fanout
            .broadcast(OutboundEvent::QuestionSkipped(QuestionSkipped {
                question_id,
                reason: payload.reason,
            }))
            .await;
        self.maybe_broadcast_leaderboard(false).await;
        self.persist().await;
        true
    }

    /// Voids a question (§4.4, §8 P5): zeroes every non-voided answer's
    /// points, subtracts the zeroed amount from each affected
    /// participant's score, and recomputes their streak by replaying
    /// their remaining answers in arrival order.
    async fn void_question(&mut self, connection_id: ConnectionId, payload: crate::events::VoidQuestionPayload) {
        if self.session.question_by_id(&payload.question_id).is_none() {
            self.fanout
                .send_to(connection_id, OutboundEvent::error(AppErrorCode::InvalidQuestion, "no such question"))
                .await;
            return;
        }

        if let Some(question) = self.session.questions.iter_mut().find(|q| q.id == payload.question_id) {
            question.voided = true;
        }

        let mut deltas: HashMap<String, i64> = HashMap::new();
        for answer in self.session.answers.iter_mut() {
            if answer.question_id == payload.question_id && !answer.voided {
                *deltas.entry(answer.participant_id.clone()).or_insert(0) += answer.points_awarded;
                answer.voided = true;
                answer.points_awarded = 0;
            }
        }

        let affected: Vec<String> = deltas.keys().cloned().collect();
        for (participant_id, delta) in &deltas {
            if let Some(participant) = self.session.participants.get_mut(participant_id) {
                participant.score -= delta;
            }
        }
        for participant_id in &affected {
            self.recompute_streak(participant_id);
            if let Some(participant) = self.session.participants.get(participant_id) {
                self.fanout
                    .broadcast(OutboundEvent::ScoreUpdated(ScoreUpdated {
                        participant_id: participant_id.clone(),
                        total_score: participant.score,
                        streak_count: participant.current_streak,
                    }))
                    .await;
            }
        }

        self.fanout
            .broadcast(OutboundEvent::QuestionVoided(QuestionVoided {
                question_id: payload.question_id.clone(),
                reason: payload.reason,
            }))
            .await;
        self.fanout
            .send_to(
                connection_id,
                OutboundEvent::VoidQuestionAck(VoidQuestionAck {
                    question_id: payload.question_id.clone(),
                }),
            )
            .await;

        self.record_audit_with_retry("question_voided", json!({ "question_id": payload.question_id }));
        self.maybe_broadcast_leaderboard(false).await;
        self.persist().await;
    }

    /// Replays a participant's non-voided answers in submission order,
    /// the same ordering `answered_at_millis` was recorded in, to recover
    /// the streak they would have had absent the voided question (I5).
    fn recompute_streak(&mut self, participant_id: &str) {
        let mut answers: Vec<&crate::model::Answer> = self
            .session
            .answers
            .iter()
            .filter(|a| a.participant_id == participant_id && !a.voided)
            .collect();
        answers.sort_by_key(|a| a.answered_at_millis);

        let mut streak = 0u32;
        for answer in answers {
            streak = if answer.correct { streak + 1 } else { 0 };
        }

        if let Some(participant) = self.session.participants.get_mut(participant_id) {
            participant.current_streak = streak;
        }
    }

    async fn end_session(&mut self) {
        if self.session.phase == SessionPhase::Ended {
            return;
        }
        self.session.phase = SessionPhase::Ended;
        self.session.ended_at_millis = Some(self.clock.now_millis());
        self.timer = None;
        let final_leaderboard = ranked_entries(&self.session, usize::MAX);
        self.fanout
            .broadcast(OutboundEvent::SessionEnded(SessionEnded { final_leaderboard }))
            .await;
        self.record_audit_with_retry("session_ended", json!({}));
        self.persist().await;
    }

    async fn handle_timer_wake(&mut self) {
        let Some(timer) = self.timer.as_mut() else { return };
        let events = timer.poll();
        let Some(question) = self.session.current_question().cloned() else { return };

        for event in events {
            match event {
                TimerEvent::Tick { remaining_ms } => {
                    self.fanout
                        .broadcast(OutboundEvent::TimerTick(TimerTick {
                            question_id: question.id.clone(),
                            remaining_ms,
                            server_time: self.clock.now_millis(),
                        }))
                        .await;
                }
                TimerEvent::Expired => {
                    self.timer = None;
                    self.fanout
                        .broadcast(OutboundEvent::TimerExpired(TimerExpired {
                            question_id: question.id.clone(),
                            server_time: self.clock.now_millis(),
                        }))
                        .await;
                    // §4.1: deadline expiry reveals automatically, the same
                    // as a controller's `show_results` — a timed-out
                    // question must not sit in `QuestionLocked` waiting for
                    // a manual command that may never come.
                    self.lock_current_question().await;
                    self.show_results().await;
                    break;
                }
            }
        }
    }

    async fn maybe_broadcast_leaderboard(&mut self, respect_coalescing: bool) {
        let now = self.clock.now();
        if respect_coalescing && !self.leaderboard.should_broadcast(now) {
            return;
        }
        let (sequence, entries) = self.leaderboard.snapshot(&self.session, now, None);
        self.fanout
            .broadcast(OutboundEvent::LeaderboardUpdated(LeaderboardUpdated { sequence, entries }))
            .await;
    }

    async fn persist(&self) {
        call_with_deadline(
            "coordinator.persist",
            DURABLE_IO_DEADLINE,
            self.durable.save_session(&self.session),
        )
        .await;
        self.recovery.mirror(&self.session).await;
    }

    /// Bans are a terminal, safety-relevant action (§5): unlike a routine
    /// `persist()`, losing one silently would let a banned participant keep
    /// reconnecting. One bounded attempt, then one bounded retry after a
    /// short backoff, logged if both fail — the durable store, not this
    /// process, remains the source of truth either way.
    fn persist_ban_with_retry(&self, participant_id: &str, ip_address: Option<String>) {
        let durable = self.durable.clone();
        let session_id = self.session.id.clone();
        let participant_id = participant_id.to_owned();
        tokio::spawn(async move {
            if call_with_deadline(
                "coordinator.ban_participant",
                DURABLE_IO_DEADLINE,
                durable.ban_participant(&session_id, &participant_id),
            )
            .await
            .is_none()
            {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                if call_with_deadline(
                    "coordinator.ban_participant.retry",
                    DURABLE_IO_DEADLINE,
                    durable.ban_participant(&session_id, &participant_id),
                )
                .await
                .is_none()
                {
                    warn!(session_id, participant_id, "ban did not persist after retry");
                }
            }

            // §3: a ban also blocks the address it was issued from, so a
            // fresh identity from the same network can't just rejoin.
            let Some(ip_address) = ip_address.filter(|ip| !ip.is_empty()) else {
                return;
            };
            if call_with_deadline(
                "coordinator.ban_ip",
                DURABLE_IO_DEADLINE,
                durable.ban_ip(&session_id, &ip_address),
            )
            .await
            .is_some()
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            if call_with_deadline(
                "coordinator.ban_ip.retry",
                DURABLE_IO_DEADLINE,
                durable.ban_ip(&session_id, &ip_address),
            )
            .await
            .is_none()
            {
                warn!(session_id, ip_address, "ip ban did not persist after retry");
            }
        });
    }

    /// Audit entries are append-only history, not state the coordinator
    /// reads back (§6), so they are written in the background: a slow audit
    /// backend must never hold up the event that triggered it.
    fn record_audit_with_retry(&self, event: &'static str, detail: serde_json::Value) {
        let audit = self.audit.clone();
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            if call_with_deadline(
                "coordinator.audit.record",
                AUDIT_IO_DEADLINE,
                audit.record(&session_id, event, detail.clone()),
            )
            .await
            .is_some()
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            if call_with_deadline(
                "coordinator.audit.record.retry",
                AUDIT_IO_DEADLINE,
                audit.record(&session_id, event, detail),
            )
            .await
            .is_none()
            {
                warn!(session_id, event, "audit record did not persist after retry");
            }
        });
    }
}

async fn sleep_until_option(wake: Option<tokio::time::Instant>) {
    match wake {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}
