//! C9 Scorer: the pure-function scoring algorithm (§4.4).
//!
//! Grounded on the scoring shape of the quiz-slide example's
//! `calculate_score` (correctness check, a speed-weighted bonus, base points
//! per question), extended with this system's streak bonus and negative
//! marking rules.

use crate::constants::{STREAK_CAP, STREAK_STEP};
use crate::model::{ExamSettings, Question, QuestionType};

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub correct: bool,
    pub base_awarded: i64,
    pub speed_bonus: i64,
    pub streak_bonus: i64,
    /// Negative when `examSettings.negativeMarkingEnabled` penalizes a wrong
    /// answer; always zero on a correct or voided answer (§4.4).
    pub negative_penalty: i64,
    pub total: i64,
}

/// Scores a single answer. `response_time_ms` is the server-measured time
/// from question start to submission receipt, already clamped to
/// `[0, time_limit_ms + ANSWER_GRACE]` by the caller (§4.3 step 4).
/// `current_streak` is the participant's streak *before* this answer.
pub fn score_answer(
    question: &Question,
    response: &[String],
    response_time_ms: i64,
    current_streak: u32,
    exam_settings: &ExamSettings,
) -> ScoreBreakdown {
    if question.voided {
        return ScoreBreakdown {
            correct: false,
            base_awarded: 0,
            speed_bonus: 0,
            streak_bonus: 0,
            negative_penalty: 0,
            total: 0,
        };
    }

    let (correct, partial_fraction) = grade(question, response);

    if !correct && partial_fraction == 0.0 {
        let negative_penalty = if exam_settings.negative_marking_enabled {
            -round_points(
                question.base_points as f64 * exam_settings.negative_marking_percentage as f64
                    / 100.0,
            )
        } else {
            0
        };
        return ScoreBreakdown {
            correct: false,
            base_awarded: 0,
            speed_bonus: 0,
            streak_bonus: 0,
            negative_penalty,
            total: negative_penalty,
        };
    }

    let base_awarded = round_points((question.base_points as f64) * partial_fraction)
        .clamp(0, question.base_points);

    let speed_bonus = if correct {
        speed_bonus_for(
            question.base_points,
            question.speed_bonus_multiplier,
            question.time_limit_ms,
            response_time_ms,
        )
    } else {
        0
    };

    let streak_bonus = if correct {
        ((current_streak as i64 + 1) * STREAK_STEP).min(STREAK_CAP)
    } else {
        0
    };

    let total = base_awarded + speed_bonus + streak_bonus;

    ScoreBreakdown {
        correct,
        base_awarded,
        speed_bonus,
        streak_bonus,
        negative_penalty: 0,
        total,
    }
}

fn round_points(value: f64) -> i64 {
    value.round() as i64
}

/// Returns `(exactly_correct, partial_credit_fraction)`. Multiple-choice
/// questions award partial credit proportional to the overlap between the
/// response and the correct set; every other question type is all-or-
/// nothing.
fn grade(question: &Question, response: &[String]) -> (bool, f64) {
    match question.kind {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            let correct = response.len() == 1 && response[0] == question.correct[0];
            (correct, if correct { 1.0 } else { 0.0 })
        }
        QuestionType::TypeAnswer => {
            let normalized: Vec<String> = response.iter().map(|r| normalize(r)).collect();
            let correct = question
                .correct
                .iter()
                .any(|accepted| normalized.iter().any(|r| r == &normalize(accepted)));
            (correct, if correct { 1.0 } else { 0.0 })
        }
        QuestionType::NumberInput => {
            let target = question.correct.first().and_then(|t| t.trim().parse::<f64>().ok());
            let submitted = response.first().and_then(|r| r.trim().parse::<f64>().ok());
            let tolerance = question.tolerance.unwrap_or(0.0).abs();
            let correct = match (target, submitted) {
                (Some(target), Some(submitted)) => (submitted - target).abs() <= tolerance,
                _ => false,
            };
            (correct, if correct { 1.0 } else { 0.0 })
        }
        QuestionType::MultipleChoice => {
            if question.correct.is_empty() {
                return (false, 0.0);
            }
            let correct_set: std::collections::HashSet<&String> = question.correct.iter().collect();
            let response_set: std::collections::HashSet<&String> = response.iter().collect();
            let true_positives = response_set.intersection(&correct_set).count();
            let false_positives = response_set.difference(&correct_set).count();
            let exact = false_positives == 0 && true_positives == correct_set.len();
            if exact {
                return (true, 1.0);
            }
            if !question.partial_credit_enabled {
                return (false, 0.0);
            }
            let fraction = ((true_positives as f64 - false_positives as f64) / correct_set.len() as f64)
                .clamp(0.0, 1.0);
            (false, fraction)
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Linear speed bonus: full `base_points * speed_bonus_multiplier` for an
/// instant answer, decaying to zero at the time limit (§4.4, §8 scenario 2).
fn speed_bonus_for(base_points: i64, multiplier: f64, time_limit_ms: i64, response_time_ms: i64) -> i64 {
    if time_limit_ms <= 0 {
        return 0;
    }
    let remaining_fraction =
        1.0 - (response_time_ms as f64 / time_limit_ms as f64).clamp(0.0, 1.0);
    round_points((base_points as f64) * multiplier * remaining_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionOption;

    fn no_exam_settings() -> ExamSettings {
        ExamSettings::default()
    }

    fn single_choice_question() -> Question {
        Question {
            id: "q1".into(),
            kind: QuestionType::SingleChoice,
            prompt: "2 + 2?".into(),
            options: vec![
                QuestionOption { id: "a".into(), text: "3".into() },
                QuestionOption { id: "b".into(), text: "4".into() },
            ],
            correct: vec!["b".into()],
            base_points: 1000,
            time_limit_ms: 10_000,
            speed_bonus_multiplier: 0.5,
            partial_credit_enabled: false,
            explanation_text: None,
            voided: false,
            tolerance: None,
        }
    }

    #[test]
    fn correct_instant_answer_gets_full_speed_bonus() {
        let q = single_choice_question();
        let result = score_answer(&q, &["b".into()], 0, 0, &no_exam_settings());
        assert!(result.correct);
        assert_eq!(result.base_awarded, 1000);
        assert_eq!(result.speed_bonus, 500);
    }

    #[test]
    fn correct_answer_at_time_limit_gets_no_speed_bonus() {
        let q = single_choice_question();
        let result = score_answer(&q, &["b".into()], 10_000, 0, &no_exam_settings());
        assert_eq!(result.speed_bonus, 0);
        assert_eq!(result.total, 1000);
    }

    /// §8 scenario 2: basePoints=100, speedBonusMultiplier=0.5, timeLimit=30s,
    /// responseTimeMs=6000 → speedBonus = round(100*0.5*(1-6000/30000)) = 40.
    #[test]
    fn scenario_2_fast_correct_answer_matches_spec_example() {
        let mut q = single_choice_question();
        q.base_points = 100;
        q.time_limit_ms = 30_000;
        let result = score_answer(&q, &["b".into()], 6_000, 2, &no_exam_settings());
        assert!(result.correct);
        assert_eq!(result.speed_bonus, 40);
        assert_eq!(result.streak_bonus, 3 * STREAK_STEP);
        assert_eq!(result.total, 100 + 40 + 3 * STREAK_STEP);
    }

    #[test]
    fn wrong_answer_scores_zero_without_negative_marking() {
        let q = single_choice_question();
        let result = score_answer(&q, &["a".into()], 500, 3, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn wrong_answer_applies_negative_marking_when_enabled() {
        let q = single_choice_question();
        let exam = ExamSettings {
            negative_marking_enabled: true,
            negative_marking_percentage: 25,
            focus_monitoring_enabled: false,
        };
        let result = score_answer(&q, &["a".into()], 500, 3, &exam);
        assert!(!result.correct);
        assert_eq!(result.negative_penalty, -250);
        assert_eq!(result.total, -250);
    }

    #[test]
    fn streak_bonus_caps() {
        let q = single_choice_question();
        let result = score_answer(&q, &["b".into()], 10_000, 50, &no_exam_settings());
        assert_eq!(result.streak_bonus, STREAK_CAP);
    }

    #[test]
    fn voided_question_always_zero() {
        let mut q = single_choice_question();
        q.voided = true;
        let result = score_answer(&q, &["b".into()], 0, 10, &no_exam_settings());
        assert_eq!(result.total, 0);
        assert!(!result.correct);
    }

    #[test]
    fn multiple_choice_partial_credit_when_enabled() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = true;
        q.correct = vec!["a".into(), "b".into()];
        let result = score_answer(&q, &["b".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.base_awarded, 500);
    }

    #[test]
    fn multiple_choice_without_partial_credit_is_all_or_nothing() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = false;
        q.correct = vec!["a".into(), "b".into()];
        let result = score_answer(&q, &["b".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.base_awarded, 0);
    }

    #[test]
    fn multiple_choice_false_positive_cancels_out_single_correct_option() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = true;
        q.correct = vec!["b".into()];
        let result = score_answer(&q, &["a".into(), "b".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.base_awarded, 0);
    }

    #[test]
    fn multiple_choice_false_positive_reduces_but_does_not_zero_credit() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = true;
        q.correct = vec!["a".into(), "b".into(), "c".into()];
        let result = score_answer(&q, &["a".into(), "b".into(), "d".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        // (2 correct - 1 incorrect) / 3 correct options = 1/3 of base_points.
        assert_eq!(result.base_awarded, 333);
    }

    #[test]
    fn multiple_choice_more_false_positives_than_true_positives_clamps_to_zero() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = true;
        q.correct = vec!["a".into(), "b".into(), "c".into()];
        let result = score_answer(&q, &["a".into(), "d".into(), "e".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.base_awarded, 0);
    }

    #[test]
    fn number_input_within_tolerance_is_correct() {
        let mut q = single_choice_question();
        q.kind = QuestionType::NumberInput;
        q.correct = vec!["100".into()];
        q.tolerance = Some(2.0);
        let result = score_answer(&q, &["98.5".into()], 0, 0, &no_exam_settings());
        assert!(result.correct);
        assert_eq!(result.base_awarded, 1000);
    }

    #[test]
    fn number_input_outside_tolerance_is_incorrect() {
        let mut q = single_choice_question();
        q.kind = QuestionType::NumberInput;
        q.correct = vec!["100".into()];
        q.tolerance = Some(2.0);
        let result = score_answer(&q, &["103".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn number_input_unparseable_response_is_incorrect() {
        let mut q = single_choice_question();
        q.kind = QuestionType::NumberInput;
        q.correct = vec!["100".into()];
        q.tolerance = Some(2.0);
        let result = score_answer(&q, &["not a number".into()], 0, 0, &no_exam_settings());
        assert!(!result.correct);
    }

    #[test]
    fn multiple_choice_exact_match_is_correct_regardless_of_partial_credit_flag() {
        let mut q = single_choice_question();
        q.kind = QuestionType::MultipleChoice;
        q.partial_credit_enabled = false;
        q.correct = vec!["a".into(), "b".into()];
        let result = score_answer(&q, &["a".into(), "b".into()], 0, 0, &no_exam_settings());
        assert!(result.correct);
        assert_eq!(result.base_awarded, 1000);
    }
}
