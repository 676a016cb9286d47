//! Advisory calls against a local mock of a chat-completions endpoint.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use common::{sample_facts, FakeSource};
use repo_trust::advisory::{Advisor, AdvisoryProvider, OpenAIProvider, ADVISORY_UNAVAILABLE};
use repo_trust::analyze::Analyzer;
use repo_trust::cache::InMemoryCache;
use repo_trust::config::AdvisoryConfig;
use repo_trust::identifier::RepositoryIdentifier;
use repo_trust::models::Rating;

const TEST_KEY: &str = "sk-test";

#[derive(Clone, Default)]
struct ChatState {
    hits: Arc<AtomicUsize>,
}

struct MockChat {
    base: String,
    hits: Arc<AtomicUsize>,
}

/// Endpoints by prefix: `/ok` (always answers), `/flaky` (503 once, then
/// answers), `/reject` (400), `/slow` (answers after three seconds). Every
/// route requires the bearer key.
async fn spawn_chat_mock() -> MockChat {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = ChatState::default();
    let hits = state.hits.clone();

    let app = Router::new()
        .route("/ok/chat/completions", post(ok))
        .route("/flaky/chat/completions", post(flaky))
        .route("/reject/chat/completions", post(reject))
        .route("/slow/chat/completions", post(slow))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockChat { base, hits }
}

fn reply(text: &str) -> Response {
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    }))
    .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TEST_KEY))
}

async fn ok(State(state): State<ChatState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    reply("Good. Clear docs and steady releases.")
}

async fn flaky(State(state): State<ChatState>, headers: HeaderMap) -> Response {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if hit == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
    }
    reply("Excellent. Widely used and actively maintained.")
}

async fn reject(State(state): State<ChatState>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::BAD_REQUEST, "unknown model").into_response()
}

async fn slow(State(state): State<ChatState>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    reply("Excellent, eventually.")
}

/// Provider config pointed at one mock route. Each test uses its own key
/// variable so parallel tests never share environment state.
fn config(mock: &MockChat, route: &str, key_env: &str) -> AdvisoryConfig {
    std::env::set_var(key_env, TEST_KEY);
    AdvisoryConfig {
        provider: "openai".to_string(),
        model: "test-model".to_string(),
        url: format!("{}/{}/", mock.base, route),
        api_key_env: key_env.to_string(),
        timeout_secs: 1,
        max_retries: 1,
        persona_seed: Some(5),
    }
}

fn advisor(config: &AdvisoryConfig) -> Advisor {
    let provider = OpenAIProvider::new(config).unwrap();
    Advisor::new(Arc::new(provider), StdRng::seed_from_u64(5))
}

fn widget() -> RepositoryIdentifier {
    RepositoryIdentifier::parse("github.com/acme/widget").unwrap()
}

#[tokio::test]
async fn test_successful_reply_is_graded() {
    let mock = spawn_chat_mock().await;
    let advisor = advisor(&config(&mock, "ok", "REPO_TRUST_TEST_KEY_OK"));

    let result = advisor
        .advise(&sample_facts(&widget()), "https://github.com/acme/widget")
        .await;

    assert!(!result.fallback);
    assert_eq!(result.grade, Rating::Good);
    assert_eq!(result.provider, "openai");
    assert!(result.text.starts_with("Good."));
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock = spawn_chat_mock().await;
    let advisor = advisor(&config(&mock, "flaky", "REPO_TRUST_TEST_KEY_FLAKY"));

    let result = advisor
        .advise(&sample_facts(&widget()), "https://github.com/acme/widget")
        .await;

    assert!(!result.fallback);
    assert_eq!(result.grade, Rating::Excellent);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock = spawn_chat_mock().await;
    let config = config(&mock, "reject", "REPO_TRUST_TEST_KEY_REJECT");

    let provider = OpenAIProvider::new(&config).unwrap();
    let err = provider.complete("system", "prompt").await.unwrap_err();
    assert!(err.to_string().contains("400"), "{}", err);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);

    let result = advisor(&config)
        .advise(&sample_facts(&widget()), "https://github.com/acme/widget")
        .await;
    assert!(result.fallback);
    assert_eq!(result.text, ADVISORY_UNAVAILABLE);
    assert_eq!(result.grade, Rating::Average);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_degrades_to_sentinel() {
    let mock = spawn_chat_mock().await;
    let mut config = config(&mock, "slow", "REPO_TRUST_TEST_KEY_SLOW");
    config.max_retries = 0;

    let result = advisor(&config)
        .advise(&sample_facts(&widget()), "https://github.com/acme/widget")
        .await;

    assert!(result.fallback);
    assert_eq!(result.text, ADVISORY_UNAVAILABLE);
    assert_eq!(result.grade, Rating::Average);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_key_never_calls_out() {
    let mock = spawn_chat_mock().await;
    let mut config = config(&mock, "ok", "REPO_TRUST_TEST_KEY_UNUSED");
    config.api_key_env = "REPO_TRUST_TEST_KEY_NEVER_SET".to_string();

    let result = advisor(&config)
        .advise(&sample_facts(&widget()), "https://github.com/acme/widget")
        .await;

    assert!(result.fallback);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_analyze_scores_when_advisory_fails() {
    let mock = spawn_chat_mock().await;
    let mut config = config(&mock, "slow", "REPO_TRUST_TEST_KEY_ANALYZE");
    config.max_retries = 0;

    let analyzer = Analyzer::new(
        FakeSource::new(),
        advisor(&config),
        Arc::new(InMemoryCache::new()),
    );
    let outcome = analyzer
        .analyze("https://github.com/acme/widget", "alice")
        .await
        .unwrap();

    assert!(!outcome.cached);
    assert!(outcome.result.advisory.fallback);
    assert_eq!(outcome.result.advisory.grade, Rating::Average);

    let score = outcome.result.score.as_ref().unwrap();
    assert!((0.0..=5.0).contains(&score.score));
    assert_eq!(score.breakdown.factors().len(), 6);
    assert_eq!(score.rating, Rating::from_score(score.score));
}
