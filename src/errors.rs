//! §7 Error handling design: the external, stable error taxonomy.
//!
//! `AppErrorCode` is the single enum carrying every code listed in spec §7.
//! It derives `error_codes::ErrorCode` (kept from the teacher's in-workspace
//! derive crate) so each variant gets a stable `"AppErrorCode::VARIANT"`
//! string, independent of `Display`/`Debug` wording that might otherwise
//! drift under refactoring.

use error_codes::ErrorCode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ErrorCode)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppErrorCode {
    SessionNotFound,
    SessionEnded,
    SessionExpired,
    SessionStarted,
    ParticipantNotFound,
    ParticipantBanned,
    InvalidJoinCode,
    ProfanityDetected,
    NicknameTaken,
    RateLimited,
    MissingToken,
    ExpiredToken,
    InvalidRole,
    Unauthorized,
    Invalid,
    TimeExpired,
    AlreadySubmitted,
    InvalidQuestion,
    Internal,
}

impl AppErrorCode {
    /// A short, human-readable message suitable for the generic
    /// `error { code, message }` outbound event (§6).
    pub fn message(self) -> &'static str {
        match self {
            Self::SessionNotFound => "session does not exist",
            Self::SessionEnded => "session has ended",
            Self::SessionExpired => "session recovery window has passed",
            Self::SessionStarted => "session has already started",
            Self::ParticipantNotFound => "participant does not exist",
            Self::ParticipantBanned => "participant is banned from this session",
            Self::InvalidJoinCode => "join code is invalid",
            Self::ProfanityDetected => "nickname rejected",
            Self::NicknameTaken => "nickname already in use",
            Self::RateLimited => "too many requests",
            Self::MissingToken => "authentication token is required",
            Self::ExpiredToken => "authentication token has expired",
            Self::InvalidRole => "role is not recognised",
            Self::Unauthorized => "not permitted to perform this action",
            Self::Invalid => "request is invalid",
            Self::TimeExpired => "the time limit for this question has passed",
            Self::AlreadySubmitted => "an answer was already submitted for this question",
            Self::InvalidQuestion => "question is not the current question",
            Self::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: AppErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_owned(),
        }
    }

    pub fn with_message(code: AppErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.to_error_code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<AppErrorCode> for AppError {
    fn from(code: AppErrorCode) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(
            AppErrorCode::AlreadySubmitted.to_error_code(),
            "AppErrorCode::AlreadySubmitted"
        );
        assert_eq!(
            AppErrorCode::RateLimited.to_error_code(),
            "AppErrorCode::RateLimited"
        );
    }
}
