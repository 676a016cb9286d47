//! Shared fixtures: a local mock of the GitHub API and repository page,
//! a scripted metadata source, and sample cache payloads.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repo_trust::config::GithubConfig;
use repo_trust::error::{Error, Result};
use repo_trust::github::MetadataSource;
use repo_trust::identifier::RepositoryIdentifier;
use repo_trust::models::{
    AdvisoryResult, CombinedResult, FactsSource, FileSample, Rating, RepositoryFacts,
};
use repo_trust::scoring;

// ─── Mock GitHub ────────────────────────────────────────────────────

/// README served for `acme/widget`: 609 characters.
pub const WIDGET_README_CHARS: usize = 609;

#[derive(Clone)]
struct MockState {
    base: String,
    web_hits: Arc<AtomicUsize>,
    files_served: Arc<Mutex<Vec<String>>>,
}

pub struct MockGitHub {
    pub base: String,
    pub web_hits: Arc<AtomicUsize>,
    pub files_served: Arc<Mutex<Vec<String>>>,
}

impl MockGitHub {
    pub fn github_config(&self) -> GithubConfig {
        GithubConfig {
            api_url: self.base.clone(),
            web_url: format!("{}/web", self.base),
            token_env: "REPO_TRUST_TEST_UNSET_TOKEN".to_string(),
            timeout_secs: 5,
            user_agent: "repo-trust-tests".to_string(),
        }
    }
}

/// Serve the mock on an ephemeral port.
///
/// Repositories by name: `widget` (full data), `solo` (one commit, nothing
/// optional), `missing` (404 everywhere), `private` (403), `limited` (403 with
/// an exhausted rate limit), `flaky` (503). The last two have a scrapeable
/// page under `/web`.
pub async fn spawn_mock() -> MockGitHub {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let web_hits = Arc::new(AtomicUsize::new(0));
    let files_served = Arc::new(Mutex::new(Vec::new()));

    let state = MockState {
        base: base.clone(),
        web_hits: web_hits.clone(),
        files_served: files_served.clone(),
    };

    let app = Router::new()
        .route("/repos/{owner}/{name}", get(repo_record))
        .route("/repos/{owner}/{name}/languages", get(languages))
        .route("/repos/{owner}/{name}/commits", get(commits))
        .route("/repos/{owner}/{name}/contributors", get(contributors))
        .route("/repos/{owner}/{name}/subscribers", get(subscribers))
        .route("/repos/{owner}/{name}/tags", get(tags))
        .route("/repos/{owner}/{name}/collaborators", get(collaborators))
        .route("/repos/{owner}/{name}/contents", get(contents))
        .route("/files/{file}", get(file_content))
        .route("/web/{owner}/{name}", get(web_page))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockGitHub {
        base,
        web_hits,
        files_served,
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
}

async fn repo_record(Path((_owner, name)): Path<(String, String)>) -> Response {
    let now = Utc::now();
    match name.as_str() {
        "widget" => Json(json!({
            "name": "Widget",
            "owner": { "login": "Acme" },
            "description": "Widgets for everyone",
            "stargazers_count": 250,
            "forks_count": 40,
            "subscribers_count": 99,
            "open_issues_count": 3,
            "created_at": "2020-01-01T00:00:00Z",
            "updated_at": (now - Duration::days(1)).to_rfc3339(),
        }))
        .into_response(),
        "solo" => Json(json!({
            "name": "solo",
            "owner": { "login": "acme" },
            "description": null,
            "stargazers_count": 0,
            "forks_count": 0,
            "open_issues_count": 0,
            "created_at": (now - Duration::days(200)).to_rfc3339(),
            "updated_at": (now - Duration::days(60)).to_rfc3339(),
        }))
        .into_response(),
        "private" => (
            StatusCode::FORBIDDEN,
            [("x-ratelimit-remaining", "42")],
            Json(json!({ "message": "Forbidden" })),
        )
            .into_response(),
        "limited" => (
            StatusCode::FORBIDDEN,
            [("x-ratelimit-remaining", "0")],
            Json(json!({ "message": "API rate limit exceeded" })),
        )
            .into_response(),
        "flaky" => (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response(),
        _ => not_found(),
    }
}

async fn languages(Path((_owner, name)): Path<(String, String)>) -> Response {
    match name.as_str() {
        "widget" => Json(json!({ "Rust": 900, "Shell": 100 })).into_response(),
        _ => not_found(),
    }
}

async fn commits(Path((_owner, name)): Path<(String, String)>) -> Response {
    let count = match name.as_str() {
        "widget" => 12,
        "solo" => 1,
        _ => return not_found(),
    };
    let items: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "sha": format!("{:07}abcdef0123456789", i),
                "commit": {
                    "message": format!("Commit {}\n\nDetails", i),
                    "author": { "date": (Utc::now() - Duration::days(i)).to_rfc3339() }
                }
            })
        })
        .collect();
    Json(items).into_response()
}

async fn contributors(Path((_owner, name)): Path<(String, String)>) -> Response {
    match name.as_str() {
        "widget" => Json(json!([
            { "login": "alice", "contributions": 120 },
            { "login": "bob", "contributions": 30 },
            { "contributions": 2, "type": "Anonymous" },
        ]))
        .into_response(),
        _ => not_found(),
    }
}

async fn subscribers(Path((_owner, name)): Path<(String, String)>) -> Response {
    match name.as_str() {
        // Fails so the record's subscribers_count is used instead.
        "widget" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => not_found(),
    }
}

async fn tags(Path((_owner, name)): Path<(String, String)>) -> Response {
    match name.as_str() {
        "widget" => Json(json!([
            { "name": "v1.0.0" },
            { "name": "v0.3.0" },
            { "name": "v0.2.0" },
            { "name": "v0.1.0" },
        ]))
        .into_response(),
        _ => not_found(),
    }
}

async fn collaborators(Path((_owner, name)): Path<(String, String)>) -> Response {
    match name.as_str() {
        "widget" => (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Must have push access" })),
        )
            .into_response(),
        _ => not_found(),
    }
}

async fn contents(
    State(state): State<MockState>,
    Path((_owner, name)): Path<(String, String)>,
) -> Response {
    if name != "widget" {
        return not_found();
    }
    let entry = |path: &str, kind: &str, size: u64| {
        json!({
            "name": path,
            "path": path,
            "type": kind,
            "size": size,
            "url": format!("{}/files/{}", state.base, path),
        })
    };
    Json(json!([
        entry("README.md", "file", WIDGET_README_CHARS as u64),
        entry("src", "dir", 0),
        entry("big.bin", "file", 2_000_000),
        entry(".gitignore", "file", 7),
        entry("Cargo.toml", "file", 30),
        entry("tests.rs", "file", 10),
    ]))
    .into_response()
}

fn encode_wrapped(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let mut out = String::new();
    for chunk in encoded.as_bytes().chunks(60) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out
}

async fn file_content(State(state): State<MockState>, Path(file): Path<String>) -> Response {
    state.files_served.lock().unwrap().push(file.clone());

    let bytes: Vec<u8> = match file.as_str() {
        "README.md" => format!("# Widget\n{}", "x".repeat(WIDGET_README_CHARS - 9)).into_bytes(),
        ".gitignore" => b"target\n".to_vec(),
        "Cargo.toml" => {
            let mut b = b"[package]\nname = \"widget\"\n".to_vec();
            b.extend_from_slice(&[0xff, 0xfe]);
            b
        }
        _ => return not_found(),
    };
    Json(json!({ "content": encode_wrapped(&bytes), "encoding": "base64" })).into_response()
}

pub const PAGE_HTML: &str = r#"<html><head>
<meta property="og:description" content="Scraped widgets">
</head><body>
<span id="repo-stars-counter-star" class="Counter">1.2k</span>
<span id="repo-network-counter" class="Counter">87</span>
<a>Contributors <span class="Counter">5</span></a>
<span class="color-fg-default text-bold mr-1">Go</span><span>100.0%</span>
<relative-time datetime="2022-02-02T00:00:00Z">Feb 2, 2022</relative-time>
<relative-time datetime="2024-01-10T00:00:00Z">Jan 10</relative-time>
</body></html>"#;

async fn web_page(
    State(state): State<MockState>,
    Path((_owner, name)): Path<(String, String)>,
) -> Response {
    state.web_hits.fetch_add(1, Ordering::SeqCst);
    match name.as_str() {
        "flaky" | "limited" => (
            [("content-type", "text/html; charset=utf-8")],
            PAGE_HTML,
        )
            .into_response(),
        "missing" => not_found(),
        _ => (StatusCode::BAD_GATEWAY, "no page").into_response(),
    }
}

// ─── Scripted metadata source ───────────────────────────────────────

/// Returns fixed facts for any repository, except names that map onto
/// fetch errors: `missing`, `private`, `down`.
pub struct FakeSource {
    pub calls: AtomicUsize,
    delay_ms: u64,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Self::with_delay(0)
    }

    pub fn with_delay(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay_ms,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, id: &RepositoryIdentifier) -> Result<RepositoryFacts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        match id.name() {
            "missing" => Err(Error::RepositoryNotFound(id.slug())),
            "private" => Err(Error::RepositoryInaccessible(id.slug())),
            "down" => Err(Error::SourceUnavailable("scripted outage".to_string())),
            _ => Ok(sample_facts(id)),
        }
    }
}

pub fn sample_facts(id: &RepositoryIdentifier) -> RepositoryFacts {
    let now = Utc::now();
    let mut facts = RepositoryFacts::empty(id, now, FactsSource::Api);
    facts.created_at = now - Duration::days(400);
    facts.updated_at = now - Duration::days(3);
    facts.stars = 120;
    facts.forks = 10;
    facts.total_commits = 30;
    facts.files = vec![
        FileSample {
            path: "README.md".to_string(),
            content: "r".repeat(800),
        },
        FileSample {
            path: "Cargo.toml".to_string(),
            content: "[package]".to_string(),
        },
    ];
    facts
}

pub fn sample_result(id: &RepositoryIdentifier) -> CombinedResult {
    let facts = sample_facts(id);
    let score = scoring::score(&facts);
    let advisory = AdvisoryResult {
        text: "Good. Solid project.".to_string(),
        grade: Rating::Good,
        persona: "maintainer".to_string(),
        provider: "canned".to_string(),
        fallback: false,
    };
    CombinedResult::assemble(&facts, Some(score), advisory, facts.fetched_at)
}
