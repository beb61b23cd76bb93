//! Boots the full service against a temp-file SQLite database and drives it
//! over real HTTP/WebSocket clients, the same shape as the teacher's
//! `tests/common/harness.rs` (bind an ephemeral port, spawn with graceful
//! shutdown, expose a base URL), generalized from a single long-lived
//! process under test to one spun up fresh per test.

use quiz_sequencer::model::{ExamSettings, Question, QuestionOption, QuestionType};
use quiz_sequencer::store::durable::{self, Options as DurableOptions};
use quiz_sequencer::store::quiz::QuizDefinition;
use quiz_sequencer::{keys, start_server, Options};
use tempfile::TempDir;
use tokio::sync::oneshot;

pub struct Harness {
    pub base_url: String,
    pub ws_base: String,
    pub quiz_id: String,
    _temp_dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Harness {
    /// Starts a fresh instance of the service on an OS-assigned port, seeded
    /// with one quiz (`quiz-1`, a two-question single-choice quiz).
    pub async fn start() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let database_url = format!("sqlite://{}/quiz.db", temp_dir.path().display());
        let quiz_id = seed_quiz(&database_url).await;

        let options = Options {
            bind: "127.0.0.1:0".parse().unwrap(),
            keys: keys::Options {
                token_secret: Some(base64::encode(b"integration-test-harness-secret!")),
            },
            store: DurableOptions {
                database_url,
                database_migrate: true,
                database_max_connections: 5,
            },
        };

        let server = start_server(options).await.expect("server must start");
        let addr = server.local_addr();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            server
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server task must not error");
        });

        Self {
            base_url: format!("http://{addr}"),
            ws_base: format!("ws://{addr}"),
            quiz_id,
            _temp_dir: temp_dir,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn http_path(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_path(&self, join_code: &str) -> String {
        format!("{}/ws/{}", self.ws_base, join_code)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn sample_quiz(quiz_id: &str) -> QuizDefinition {
    QuizDefinition {
        quiz_id: quiz_id.to_owned(),
        title: "Integration Test Quiz".into(),
        questions: vec![
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
                time_limit_ms: 20_000,
                speed_bonus_multiplier: 0.5,
                partial_credit_enabled: false,
                explanation_text: Some("Basic arithmetic.".into()),
                voided: false,
                tolerance: None,
            },
            Question {
                id: "q2".into(),
                kind: QuestionType::SingleChoice,
                prompt: "Capital of France?".into(),
                options: vec![
                    QuestionOption { id: "a".into(), text: "Berlin".into() },
                    QuestionOption { id: "b".into(), text: "Paris".into() },
                ],
                correct: vec!["b".into()],
                base_points: 1000,
                time_limit_ms: 20_000,
                speed_bonus_multiplier: 0.5,
                partial_credit_enabled: false,
                explanation_text: None,
                voided: false,
                tolerance: None,
            },
        ],
        exam_settings: ExamSettings::default(),
    }
}

/// Runs migrations and inserts a quiz row via a short-lived connection to
/// the same database file `start_server` will reconnect to; `sqlx::migrate!`
/// is idempotent against an already-migrated schema.
async fn seed_quiz(database_url: &str) -> String {
    let options = DurableOptions {
        database_url: database_url.to_owned(),
        database_migrate: true,
        database_max_connections: 1,
    };
    let store = durable::connect(&options).await.expect("seed database must connect");
    let pool = store.pool();

    let quiz_id = "quiz-1".to_owned();
    let quiz = sample_quiz(&quiz_id);
    sqlx::query("INSERT INTO quizzes (id, title, snapshot) VALUES (?1, ?2, ?3)")
        .bind(&quiz_id)
        .bind(&quiz.title)
        .bind(serde_json::to_string(&quiz).expect("quiz must serialize"))
        .execute(&pool)
        .await
        .expect("seed insert must succeed");

    quiz_id
}
