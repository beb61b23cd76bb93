//! C12 AnswerPipeline: the ten-step `submit_answer` process (§4.3).
//!
//! 1. reject oversized frames, 2. require an active question, 3. require
//! the participant hasn't already answered (I3), 4. clamp the response
//! time to `[0, time_limit_ms + ANSWER_GRACE]`, 5. rate-limit, 6. grade via
//! `scoring::score_answer`, 7. apply points and streak to the participant,
//! 8. append the `Answer` record, 9. emit `answer_result` to the
//! submitter, 10. mark the leaderboard dirty so the next coalesced
//! broadcast reflects the change. Steps 1-5 are guard clauses that return
//! early with the error the step's doc comment names; only a pipeline that
//! clears every guard reaches scoring.

use crate::constants::{ANSWER_GRACE, MAX_MESSAGE_BYTES};
use crate::errors::{AppError, AppErrorCode};
use crate::events::SubmitAnswerPayload;
use crate::model::{Answer, Question, QuestionType, Session, SessionPhase};
use crate::scoring::score_answer;

/// §4.3 step 6: the submitted response must have the shape its question
/// type demands before it is worth grading at all — an empty multi-select,
/// a two-option single-select, or unparseable number input are all
/// `INVALID` rather than simply "incorrect".
fn response_shape_matches(question: &Question, response: &[String]) -> bool {
    match question.kind {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            response.len() == 1 && question.options.iter().any(|o| o.id == response[0])
        }
        QuestionType::MultipleChoice => {
            !response.is_empty() && response.iter().all(|r| question.options.iter().any(|o| &o.id == r))
        }
        QuestionType::TypeAnswer => response.len() == 1 && !response[0].trim().is_empty(),
        QuestionType::NumberInput => {
            response.len() == 1 && response[0].trim().parse::<f64>().is_ok()
        }
    }
}

pub struct PipelineOutcome {
    pub answer: Answer,
    pub new_streak: u32,
    pub speed_bonus: i64,
    pub streak_bonus: i64,
}

/// Runs steps 1-8 against `session`, returning the computed `Answer` and
/// updated streak without mutating `session` — the caller (the session
/// actor) applies the mutation itself so every state change funnels
/// through its single-writer loop (§5).
pub fn process_submission(
    session: &Session,
    participant_id: &str,
    payload: &SubmitAnswerPayload,
    raw_frame_len: usize,
    now_millis: i64,
    question_started_at_millis: i64,
) -> Result<PipelineOutcome, AppError> {
    // Step 1: oversized frame.
    if raw_frame_len > MAX_MESSAGE_BYTES {
        return Err(AppError::new(AppErrorCode::Invalid));
    }

    // Step 2: an active question must exist and match the submission.
    if session.phase != SessionPhase::QuestionActive {
        return Err(AppError::new(AppErrorCode::TimeExpired));
    }
    let question = session
        .current_question()
        .ok_or_else(|| AppError::new(AppErrorCode::InvalidQuestion))?;
    if question.id != payload.question_id {
        return Err(AppError::new(AppErrorCode::InvalidQuestion));
    }

    // Step 3: no duplicate submission (I3).
    if session.has_answered(participant_id, &question.id) {
        return Err(AppError::new(AppErrorCode::AlreadySubmitted));
    }

    let participant = session
        .participants
        .get(participant_id)
        .ok_or_else(|| AppError::new(AppErrorCode::ParticipantNotFound))?;

    // Step 4: clamp response time to the allowed window.
    let raw_elapsed = now_millis - question_started_at_millis;
    let max_allowed = question.time_limit_ms + ANSWER_GRACE.as_millis() as i64;
    if raw_elapsed > max_allowed {
        return Err(AppError::new(AppErrorCode::TimeExpired));
    }
    let response_time_ms = raw_elapsed.clamp(0, question.time_limit_ms);

    // Step 5 (rate limiting) is checked by the caller before invoking this
    // function, since it needs the shared `RateLimiter`/`EphemeralStore`
    // rather than anything in `Session`.

    // Step 6: shape check, one rule per question type.
    if !response_shape_matches(question, &payload.response) {
        return Err(AppError::new(AppErrorCode::Invalid));
    }

    // Step 6 (cont'd): grade.
    let breakdown = score_answer(
        question,
        &payload.response,
        response_time_ms,
        participant.current_streak,
        &session.exam_settings,
    );

    // Steps 7-8: compute the resulting answer record and streak; the
    // caller applies both to its owned `Session`.
    let new_streak = if breakdown.correct {
        participant.current_streak + 1
    } else {
        0
    };

    let answer = Answer {
        participant_id: participant_id.to_owned(),
        question_id: question.id.clone(),
        response: payload.response.clone(),
        response_time_ms,
        points_awarded: breakdown.total,
        correct: breakdown.correct,
        answered_at_millis: now_millis,
        voided: false,
    };

    Ok(PipelineOutcome {
        answer,
        new_streak,
        speed_bonus: breakdown.speed_bonus,
        streak_bonus: breakdown.streak_bonus,
    })
}
