use axum::body::Body;
use axum::http::{Request, StatusCode};
use quiz_engine::client::{HttpContentClient, RetryPolicy};
use quiz_engine::config::{QuizSettings, Settings};
use quiz_engine::mapper::to_original_index;
use quiz_engine::scoring::Outcome;
use quiz_engine::session::{ErrorKind, QuizRunner, SessionPhase, SubmitOutcome};
use quiz_engine::state::AppState;
use quiz_engine::storage::{FileSessionStore, MemorySessionStore, SessionStore};
use quiz_engine::{build_state, routes::build_router};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn settings() -> Settings {
    Settings {
        content_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/content")),
        ..Settings::default()
    }
}

async fn spawn_server() -> (String, AppState) {
    let state = build_state(&settings()).expect("state");
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn http_client(base: &str) -> Arc<HttpContentClient> {
    Arc::new(HttpContentClient::new(base, RetryPolicy::default(), Duration::from_secs(5)).unwrap())
}

fn runner(module: &str, client: Arc<HttpContentClient>, store: Arc<dyn SessionStore>) -> QuizRunner {
    QuizRunner::new(module, QuizSettings::default(), client.clone(), client, store)
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("quiz-engine-it-{}", uuid::Uuid::new_v4()))
}

/// Display index of the correct choice for the runner's current question.
fn correct_display_index(runner: &QuizRunner, state: &AppState) -> usize {
    let current = runner.current_question().unwrap();
    let key = state
        .registry
        .question(runner.module(), current.question.id)
        .and_then(|q| q.correct_answer_index)
        .unwrap();
    (0..current.choice_count())
        .find(|&d| to_original_index(current, d).unwrap() == key)
        .unwrap()
}

#[tokio::test]
async fn lists_visible_modules_only() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let body = client
        .get(format!("{}/api/v1/modules", base))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let modules: Vec<&str> = body["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["module"].as_str().unwrap())
        .collect();
    assert_eq!(modules, vec!["laravel", "node", "react", "testing", "vue"]);
    assert_eq!(body["modules"][1]["questionCount"], 6);
}

#[tokio::test]
async fn question_pool_hides_answer_key() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/v1/modules/react/questions", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<serde_json::Value>().await.unwrap();
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    assert!(questions.iter().all(|q| q.get("correctAnswerIndex").is_none()));

    let missing = client
        .get(format!("{}/api/v1/modules/elixir/questions", base))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let err = missing.json::<serde_json::Value>().await.unwrap();
    assert_eq!(err["error"]["code"], "NOT_FOUND");
    assert_eq!(err["error"]["request_id"], "req-42");

    let bad = client
        .get(format!("{}/api/v1/modules/Node/questions", base))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn validate_endpoint_uses_original_index() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/answers/validate", base);

    let right = client
        .post(&url)
        .json(&json!({"module": "node", "questionId": 102, "answerIndex": 1}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(right["isCorrect"], true);
    assert!(right["explanation"].as_str().unwrap().contains("nextTick"));

    let wrong = client
        .post(&url)
        .json(&json!({"module": "node", "questionId": 102, "answerIndex": 0}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(wrong["isCorrect"], false);

    let open = client
        .post(&url)
        .json(&json!({"module": "testing", "questionId": 503}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(open["isCorrect"], true);

    let unknown = client
        .post(&url)
        .json(&json!({"module": "node", "questionId": 999, "answerIndex": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let invalid = client
        .post(&url)
        .json(&json!({"module": "../etc", "questionId": 101, "answerIndex": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
    let err = invalid.json::<serde_json::Value>().await.unwrap();
    assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
    assert!(!err["error"]["details"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn full_session_over_http_passes() {
    let (base, state) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let mut runner = runner("node", http_client(&base), store);

    assert_eq!(runner.start().await.unwrap(), SessionPhase::Active);
    assert_eq!(runner.session().unwrap().len(), 6);

    while runner.phase() == SessionPhase::Active {
        let display = correct_display_index(&runner, &state);
        runner.select(display).await.unwrap();
        match runner.submit().await.unwrap() {
            SubmitOutcome::Answered(feedback) => assert!(feedback.is_correct),
            other => panic!("unexpected outcome {other:?}"),
        }
        runner.next().await.unwrap();
    }

    assert_eq!(runner.phase(), SessionPhase::Completed);
    let summary = runner.summary().unwrap();
    assert_eq!(summary.score, 6);
    assert_eq!(summary.percentage, 100);
    assert_eq!(summary.outcome, Outcome::Passed);
    assert!(summary.missed.is_empty());
}

#[tokio::test]
async fn wrong_answers_fail_with_review_list() {
    let (base, state) = spawn_server().await;
    let mut runner = runner("vue", http_client(&base), Arc::new(MemorySessionStore::new()));
    runner.start().await.unwrap();

    let mut missed = Vec::new();
    let mut index = 0;
    while runner.phase() == SessionPhase::Active {
        let correct = correct_display_index(&runner, &state);
        // answer the first two questions wrong
        let display = if index < 2 { (correct + 1) % 4 } else { correct };
        if index < 2 {
            missed.push(runner.current_question().unwrap().question.id);
        }
        runner.select(display).await.unwrap();
        runner.submit().await.unwrap();
        runner.next().await.unwrap();
        index += 1;
    }

    let summary = runner.summary().unwrap();
    assert_eq!(summary.score, 2);
    assert_eq!(summary.percentage, 50);
    assert_eq!(summary.outcome, Outcome::Failed);
    assert_eq!(summary.missed, missed);
}

#[tokio::test]
async fn reload_resumes_from_file_store() {
    let (base, state) = spawn_server().await;
    let dir = temp_dir();
    let client = http_client(&base);

    let mut first = runner("react", client.clone(), Arc::new(FileSessionStore::new(&dir)));
    first.start().await.unwrap();
    for _ in 0..2 {
        let display = correct_display_index(&first, &state);
        first.select(display).await.unwrap();
        first.submit().await.unwrap();
        first.next().await.unwrap();
    }
    let saved = first.session().cloned().unwrap();
    drop(first);

    let mut second = runner("react", client.clone(), Arc::new(FileSessionStore::new(&dir)));
    assert_eq!(second.start().await.unwrap(), SessionPhase::Active);
    assert_eq!(second.session(), Some(&saved));
    assert_eq!(second.session().unwrap().position, 2);
    assert_eq!(second.session().unwrap().score, 2);

    let old_id = saved.session_id;
    second.restart().await.unwrap();
    let fresh = second.session().unwrap();
    assert_ne!(fresh.session_id, old_id);
    assert_eq!(fresh.position, 0);
    assert_eq!(fresh.score, 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn empty_and_unknown_modules_have_no_questions() {
    let (base, _) = spawn_server().await;
    let client = http_client(&base);

    let mut hidden = runner("graphql", client.clone(), Arc::new(MemorySessionStore::new()));
    assert_eq!(hidden.start().await.unwrap(), SessionPhase::Empty);
    assert!(hidden.last_error().is_none());

    let mut unknown = runner("elixir", client, Arc::new(MemorySessionStore::new()));
    assert_eq!(unknown.start().await.unwrap(), SessionPhase::Empty);
}

#[tokio::test]
async fn unreachable_service_keeps_loading() {
    let client = Arc::new(
        HttpContentClient::new(
            "http://127.0.0.1:9",
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            Duration::from_secs(2),
        )
        .unwrap(),
    );
    let mut runner = runner("node", client, Arc::new(MemorySessionStore::new()));
    assert_eq!(runner.start().await.unwrap(), SessionPhase::Loading);
    assert_eq!(runner.last_error().unwrap().kind, ErrorKind::Transient);
    assert!(runner.session().is_none());
}

#[tokio::test]
async fn router_serves_without_network() {
    let state = build_state(&settings()).unwrap();
    let app = build_router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/modules/testing/questions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/answers/validate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"module":"testing","questionId":502,"answerIndex":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["isCorrect"], true);
}

#[tokio::test]
async fn local_content_runs_without_service() {
    let state = build_state(&settings()).unwrap();
    let local = Arc::new(state.local_content());
    let mut runner = QuizRunner::new(
        "laravel",
        QuizSettings { question_count: 2, pass_percent: 70 },
        local.clone(),
        local,
        Arc::new(MemorySessionStore::new()),
    );
    runner.start().await.unwrap();
    assert_eq!(runner.session().unwrap().len(), 2);
    while runner.phase() == SessionPhase::Active {
        let display = correct_display_index(&runner, &state);
        runner.select(display).await.unwrap();
        runner.submit().await.unwrap();
        runner.next().await.unwrap();
    }
    assert_eq!(runner.summary().unwrap().outcome, Outcome::Passed);
}

#[tokio::test]
async fn runner_from_settings_uses_service_and_session_dir() {
    let (base, state) = spawn_server().await;
    let dir = temp_dir();
    let settings = Settings {
        api_base_url: base,
        session_dir: dir.clone(),
        quiz: QuizSettings { question_count: 3, pass_percent: 70 },
        ..settings()
    };

    let mut runner = quiz_engine::build_runner(&settings, "node").unwrap();
    assert_eq!(runner.start().await.unwrap(), SessionPhase::Active);
    assert_eq!(runner.session().unwrap().len(), 3);
    let display = correct_display_index(&runner, &state);
    runner.select(display).await.unwrap();
    runner.submit().await.unwrap();
    assert!(dir.join("quiz-session_node.json").exists());

    let mut reloaded = quiz_engine::build_runner(&settings, "node").unwrap();
    reloaded.start().await.unwrap();
    assert_eq!(reloaded.session().unwrap().score, 1);
    assert!(reloaded.feedback().unwrap().is_correct);

    let _ = std::fs::remove_dir_all(dir);
}
