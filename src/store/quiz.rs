//! `QuizStore`: the one read the admin surface needs from quiz authoring
//! (out of scope per spec.md §1) to start a session — a quiz's questions
//! and exam settings, addressed by id. Grounded on the same
//! snapshot-as-JSON-blob pattern `SqlDurableStore::save_session`/
//! `load_session` use for `sessions`, reused here for the sibling
//! `quizzes` table the teacher's `storage.rs` already treats as a peer
//! collection.

use crate::model::{ExamSettings, Question};
use crate::store::QuizStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Any, Pool, Row};

/// Everything a new session needs from the quiz it was created against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub quiz_id: String,
    pub title: String,
    pub questions: Vec<Question>,
    pub exam_settings: ExamSettings,
}

#[derive(Clone, Debug)]
pub struct SqlQuizStore(Pool<Any>);

impl SqlQuizStore {
    pub fn new(pool: Pool<Any>) -> Self {
        Self(pool)
    }
}

#[async_trait]
impl QuizStore for SqlQuizStore {
    async fn load_quiz(&self, quiz_id: &str) -> eyre::Result<Option<QuizDefinition>> {
        let row = sqlx::query("SELECT snapshot FROM quizzes WHERE id = ?1")
            .bind(quiz_id)
            .fetch_optional(&self.0)
            .await?;
        match row {
            Some(row) => {
                let snapshot: String = row.get(0);
                Ok(Some(serde_json::from_str(&snapshot)?))
            }
            None => Ok(None),
        }
    }
}

/// An in-process quiz catalog, seeded at startup, for tests and for
/// single-binary demo deployments that don't run a separate authoring
/// service. Swappable for `SqlQuizStore` without the rest of the system
/// noticing, the point of the trait seam.
pub struct InMemoryQuizStore {
    quizzes: dashmap::DashMap<String, QuizDefinition>,
}

impl InMemoryQuizStore {
    pub fn new() -> Self {
        Self {
            quizzes: dashmap::DashMap::new(),
        }
    }

    pub fn insert(&self, quiz: QuizDefinition) {
        self.quizzes.insert(quiz.quiz_id.clone(), quiz);
    }
}

impl Default for InMemoryQuizStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuizStore for InMemoryQuizStore {
    async fn load_quiz(&self, quiz_id: &str) -> eyre::Result<Option<QuizDefinition>> {
        Ok(self.quizzes.get(quiz_id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionType, QuestionOption};

    fn sample_quiz(id: &str) -> QuizDefinition {
        QuizDefinition {
            quiz_id: id.to_owned(),
            title: "Sample Quiz".into(),
            questions: vec![Question {
                id: "q1".into(),
                kind: QuestionType::SingleChoice,
                prompt: "2 + 2?".into(),
                options: vec![
                    QuestionOption { id: "a".into(), text: "3".into() },
                    QuestionOption { id: "b".into(), text: "4".into() },
                ],
                correct: vec!["b".into()],
                base_points: 1000,
                time_limit_ms: 20_000,
                speed_bonus_multiplier: 0.5,
                partial_credit_enabled: false,
                explanation_text: None,
                voided: false,
                tolerance: None,
            }],
            exam_settings: ExamSettings::default(),
        }
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_a_quiz() {
        let store = InMemoryQuizStore::new();
        store.insert(sample_quiz("quiz-1"));
        let loaded = store.load_quiz("quiz-1").await.unwrap().unwrap();
        assert_eq!(loaded.questions.len(), 1);
        assert!(store.load_quiz("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sql_store_round_trips_via_snapshot_json() {
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE quizzes (id TEXT PRIMARY KEY, title TEXT NOT NULL, snapshot TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let quiz = sample_quiz("quiz-2");
        sqlx::query("INSERT INTO quizzes (id, title, snapshot) VALUES (?1, ?2, ?3)")
            .bind(&quiz.quiz_id)
            .bind(&quiz.title)
            .bind(serde_json::to_string(&quiz).unwrap())
            .execute(&pool)
            .await
            .unwrap();

        let store = SqlQuizStore::new(pool);
        let loaded = store.load_quiz("quiz-2").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Sample Quiz");
        assert!(store.load_quiz("missing").await.unwrap().is_none());
    }
}
