//! The tiny read/write HTTP surface that sits outside the per-session
//! real-time core: creating a session from a quiz (so a controller has a
//! join code and a host token to open its WebSocket with), a health
//! check, and a read-only session summary for operational visibility.
//! The full admin CRUD surface (quiz authoring, participant management
//! UI, dashboards) stays out of scope per spec.md §1; grounded on the
//! teacher's `info::status`/`hello_world` handlers — small `IntoResponse`
//! structs returned straight from narrow `Extension<T>` arguments, no
//! single monolithic `AppState`.

use crate::clock::SharedClock;
use crate::errors::{AppError, AppErrorCode};
use crate::rate_limiter::RateLimiter;
use crate::registry::SharedRegistry;
use crate::session::coordinator;
use crate::store::{AuditLog, DurableStore, QuizStore};
use crate::token::{Role, TokenIssuer};
use crate::util::generate_join_code;
use axum::extract::{Extension, Json, Path};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: AppErrorCode,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.code {
            AppErrorCode::SessionNotFound | AppErrorCode::ParticipantNotFound => StatusCode::NOT_FOUND,
            AppErrorCode::Unauthorized | AppErrorCode::InvalidRole | AppErrorCode::MissingToken | AppErrorCode::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AppErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppErrorCode::Invalid | AppErrorCode::InvalidJoinCode | AppErrorCode::ProfanityDetected | AppErrorCode::NicknameTaken => {
                StatusCode::BAD_REQUEST
            }
            AppErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorBody { code: self.code, message: self.message })).into_response()
    }
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub quiz_id: String,
    /// Omit to let the server mint a fresh host identity; provided when a
    /// single controller account hosts many sessions over time and wants
    /// every token issued under the same subject.
    pub host_subject: Option<String>,
    /// Mirrors `Session.allowLateJoiners` (§3): whether a join after
    /// `LOBBY` is admitted by default. Defaults to `false`.
    #[serde(default)]
    pub allow_late_joiners: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub join_code: String,
    pub host_token: String,
}

impl IntoResponse for CreateSessionResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}

/// `POST /sessions`: loads the quiz, allocates a unique join code, spawns
/// its `SessionCoordinator` actor, registers it, and issues the host a
/// bearer token scoped to `Role::Controller` (§4.1, §4.8).
#[allow(clippy::too_many_arguments)]
pub async fn create_session(
    Extension(registry): Extension<SharedRegistry>,
    Extension(quizzes): Extension<Arc<dyn QuizStore>>,
    Extension(durable): Extension<Arc<dyn DurableStore>>,
    Extension(audit): Extension<Arc<dyn AuditLog>>,
    Extension(rate_limiter): Extension<Arc<RateLimiter>>,
    Extension(clock): Extension<SharedClock>,
    Extension(tokens): Extension<Arc<TokenIssuer>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<CreateSessionResponse, AppError> {
    let quiz = quizzes
        .load_quiz(&request.quiz_id)
        .await
        .map_err(|_| AppError::new(AppErrorCode::Internal))?
        .ok_or_else(|| AppError::new(AppErrorCode::Invalid))?;

    let join_code = allocate_join_code(&registry, durable.as_ref()).await?;
    let session_id = uuid::Uuid::new_v4().to_string();
    let host_subject = request.host_subject.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now_millis = clock.now_millis();

    let handle = coordinator::spawn(
        session_id.clone(),
        join_code.clone(),
        host_subject.clone(),
        quiz.questions,
        quiz.exam_settings,
        request.allow_late_joiners,
        clock.clone(),
        durable.clone(),
        audit.clone(),
        rate_limiter.clone(),
        registry.clone(),
        now_millis,
    );
    registry.insert(handle);

    let host_token = tokens
        .issue(&session_id, Role::Controller, &host_subject, now_millis, crate::constants::HOST_TOKEN_TTL.as_millis() as i64)
        .map_err(|_| AppError::new(AppErrorCode::Internal))?;

    let _ = audit
        .record(&session_id, "session_created", json!({ "quiz_id": request.quiz_id }))
        .await;
    info!(session_id, join_code, quiz_id = %request.quiz_id, "session created");

    Ok(CreateSessionResponse { session_id, join_code, host_token })
}

async fn allocate_join_code(registry: &SharedRegistry, durable: &dyn DurableStore) -> Result<String, AppError> {
    for _ in 0..10 {
        let candidate = generate_join_code();
        if registry.join_code_in_use(&candidate) {
            continue;
        }
        if durable.session_exists_for_join_code(&candidate).await.unwrap_or(false) {
            continue;
        }
        return Ok(candidate);
    }
    Err(AppError::new(AppErrorCode::Internal))
}

#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub join_code: String,
    pub phase: crate::model::SessionPhase,
    pub participant_count: usize,
    pub current_question_index: Option<usize>,
}

impl IntoResponse for SessionInfoResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// `GET /sessions/:id/info`: a read-only projection of durable session
/// state for dashboards/operators, never the live ephemeral state a
/// connected client sees — the full admin surface stays out of scope
/// (spec.md §1), this is kept only for operational visibility.
pub async fn session_info(
    Extension(durable): Extension<Arc<dyn DurableStore>>,
    Path(session_id): Path<String>,
) -> Result<SessionInfoResponse, AppError> {
    let session = durable
        .load_session(&session_id)
        .await
        .map_err(|_| AppError::new(AppErrorCode::Internal))?
        .ok_or_else(|| AppError::new(AppErrorCode::SessionNotFound))?;

    Ok(SessionInfoResponse {
        session_id: session.id,
        join_code: session.join_code,
        phase: session.phase,
        participant_count: session.participants.len(),
        current_question_index: session.current_question_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExamSettings;
    use crate::registry::SessionRegistry;
    use crate::store::durable::{connect as connect_durable, Options as DurableOptions, SqlDurableStore};

    async fn in_memory_durable() -> SqlDurableStore {
        connect_durable(&DurableOptions {
            database_url: "sqlite::memory:".into(),
            database_migrate: true,
            database_max_connections: 1,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn allocate_join_code_avoids_registry_collisions() {
        let registry = SessionRegistry::new();
        let durable = in_memory_durable().await;
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        registry.insert(crate::session::coordinator::SessionHandle {
            session_id: "s1".into(),
            join_code: "AAAAAA".into(),
            inbox: tx,
        });
        for _ in 0..50 {
            let code = allocate_join_code(&registry, &durable).await.unwrap();
            assert_ne!(code, "AAAAAA");
        }
    }

    #[tokio::test]
    async fn session_info_projects_durable_state() {
        let durable = Arc::new(in_memory_durable().await);
        let session = crate::model::Session {
            id: "s1".into(),
            join_code: "ABC123".into(),
            host_subject: "host".into(),
            phase: crate::model::SessionPhase::Lobby,
            questions: vec![],
            current_question_index: None,
            participants: Default::default(),
            answers: vec![],
            allow_late_joiners: false,
            exam_settings: ExamSettings::default(),
            created_at_millis: 0,
            ended_at_millis: None,
        };
        durable.save_session(&session).await.unwrap();

        let response = session_info(Extension(durable.clone() as Arc<dyn DurableStore>), Path("s1".into()))
            .await
            .unwrap();
        assert_eq!(response.join_code, "ABC123");
        assert_eq!(response.participant_count, 0);

        let missing = session_info(Extension(durable as Arc<dyn DurableStore>), Path("missing".into())).await;
        assert!(missing.is_err());
    }
}
