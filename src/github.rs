//! Repository metadata sources.
//!
//! A [`MetadataSource`] turns a [`RepositoryIdentifier`] into a
//! [`RepositoryFacts`] snapshot. Two implementations exist:
//!
//! - **[`GitHubApiSource`]**: the structured GitHub REST v3 API. Only the
//!   repository record is mandatory; languages, commits, contributors,
//!   watchers, tags, collaborators and the root file listing are optional
//!   signals that default to empty or zero when their call fails.
//! - **[`crate::scrape::ScrapeSource`]**: the public HTML page, used when
//!   the API is unreachable or rate-limited.
//!
//! [`FallbackSource`] chains the two. It consults the fallback only when the
//! primary reports [`Error::SourceUnavailable`]; not-found and forbidden
//! answers are final.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::identifier::RepositoryIdentifier;
use crate::models::{
    CommitSummary, ContributorSummary, FactsSource, FileSample, RepositoryFacts,
};
use crate::scrape::ScrapeSource;

/// Root entries considered for file sampling.
pub const MAX_SAMPLED_FILES: usize = 5;
/// Files larger than this (bytes, as reported by the listing) are skipped.
pub const MAX_SAMPLED_FILE_BYTES: u64 = 1_000_000;
/// Characters kept from each sampled file.
pub const SAMPLE_CONTENT_CHARS: usize = 1000;

const RECENT_COMMITS: usize = 5;
const SHORT_SHA_LEN: usize = 7;

/// Something that can produce a facts snapshot for a repository.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, id: &RepositoryIdentifier) -> Result<RepositoryFacts>;
}

// ============ Wire records ============

#[derive(Debug, Deserialize)]
struct RepoRecord {
    name: String,
    owner: OwnerRecord,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    subscribers_count: Option<u64>,
    #[serde(default)]
    open_issues_count: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OwnerRecord {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommitRecord {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ContributorRecord {
    // Anonymous contributors carry no login.
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    contributions: u64,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: Option<String>,
}

// ============ GitHub REST API ============

pub struct GitHubApiSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubApiSource {
    /// Build from config. The token is read from the environment variable
    /// named by `token_env`; an absent token means unauthenticated calls.
    pub fn new(config: &GithubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            debug!(env = %config.token_env, "no GitHub token set; using unauthenticated API");
        }
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn repo_url(&self, id: &RepositoryIdentifier, suffix: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, id.owner(), id.name(), suffix)
    }

    /// The repository record. Its failures decide the outcome of the fetch.
    async fn repo_record(&self, id: &RepositoryIdentifier) -> Result<RepoRecord> {
        let response = self
            .get(&self.repo_url(id, ""))
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("GitHub API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, response.headers(), id));
        }

        response
            .json::<RepoRecord>()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("GitHub API returned an unreadable record: {}", e)))
    }

    /// Fetch and decode an optional signal; any failure is logged and
    /// reported as `None`.
    async fn optional<T: DeserializeOwned>(&self, url: &str, what: &str) -> Option<T> {
        let response = match self.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(signal = what, error = %e, "optional GitHub call failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(signal = what, status = status.as_u16(), "optional GitHub call failed");
            return None;
        }

        match response.json::<T>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(signal = what, error = %e, "optional GitHub response was unreadable");
                None
            }
        }
    }

    async fn count_list(&self, url: &str, what: &str) -> Option<u64> {
        self.optional::<Vec<serde_json::Value>>(url, what)
            .await
            .map(|items| items.len() as u64)
    }

    async fn sample_files(&self, id: &RepositoryIdentifier) -> Vec<FileSample> {
        let entries: Vec<ContentEntry> = self
            .optional(&self.repo_url(id, "/contents"), "contents")
            .await
            .unwrap_or_default();

        let mut files = Vec::new();
        for entry in entries.into_iter().take(MAX_SAMPLED_FILES) {
            if entry.kind != "file" {
                continue;
            }
            if entry.size > MAX_SAMPLED_FILE_BYTES {
                debug!(path = %entry.path, size = entry.size, "skipping large file");
                continue;
            }

            let Some(body) = self.optional::<FileContent>(&entry.url, "file").await else {
                continue;
            };
            match body.content.as_deref().map(decode_content) {
                Some(Ok(content)) => files.push(FileSample {
                    path: entry.path,
                    content,
                }),
                Some(Err(e)) => {
                    warn!(path = %entry.path, error = %e, "could not decode sampled file");
                }
                None => {}
            }
        }
        files
    }
}

#[async_trait]
impl MetadataSource for GitHubApiSource {
    fn name(&self) -> &str {
        "github-api"
    }

    async fn fetch(&self, id: &RepositoryIdentifier) -> Result<RepositoryFacts> {
        let fetched_at = Utc::now();
        let record = self.repo_record(id).await?;
        debug!(repo = %id, "fetched repository record");

        let languages: BTreeMap<String, u64> = self
            .optional(&self.repo_url(id, "/languages"), "languages")
            .await
            .unwrap_or_default();

        let commits: Vec<CommitRecord> = self
            .optional(&self.repo_url(id, "/commits?per_page=30"), "commits")
            .await
            .unwrap_or_default();

        let contributors: Vec<ContributorRecord> = self
            .optional(&self.repo_url(id, "/contributors?per_page=10"), "contributors")
            .await
            .unwrap_or_default();

        let watchers = match self
            .count_list(&self.repo_url(id, "/subscribers?per_page=100"), "subscribers")
            .await
        {
            Some(n) => n,
            None => record.subscribers_count.unwrap_or(0),
        };

        let tags = self
            .count_list(&self.repo_url(id, "/tags?per_page=100"), "tags")
            .await
            .unwrap_or(0);

        let collaborators = self
            .count_list(&self.repo_url(id, "/collaborators?per_page=100"), "collaborators")
            .await
            .unwrap_or(0);

        let files = self.sample_files(id).await;

        let total_commits = commits.len() as u64;
        let facts = RepositoryFacts {
            owner: record.owner.login,
            name: record.name,
            description: record.description.filter(|d| !d.trim().is_empty()),
            stars: record.stargazers_count,
            forks: record.forks_count,
            watchers,
            open_issues: record.open_issues_count,
            tags,
            collaborators,
            contributors: contributors.len() as u64,
            top_contributors: contributors
                .into_iter()
                .map(|c| ContributorSummary {
                    login: c.login.unwrap_or_else(|| "anonymous".to_string()),
                    contributions: c.contributions,
                })
                .collect(),
            languages: language_shares(&languages),
            created_at: record.created_at,
            updated_at: record.updated_at,
            total_commits,
            is_single_commit: total_commits == 1,
            recent_commits: commits.iter().take(RECENT_COMMITS).map(summarize_commit).collect(),
            files,
            fetched_at,
            source: FactsSource::Api,
        };

        info!(
            repo = %id,
            stars = facts.stars,
            commits = facts.total_commits,
            files = facts.files.len(),
            "collected facts from GitHub API"
        );
        Ok(facts)
    }
}

/// Map a failed repository-record status onto the error taxonomy.
fn classify_status(status: StatusCode, headers: &HeaderMap, id: &RepositoryIdentifier) -> Error {
    let rate_limited = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);

    match status.as_u16() {
        404 => Error::RepositoryNotFound(id.slug()),
        401 | 403 if rate_limited => {
            Error::SourceUnavailable(format!("GitHub API rate limit exhausted ({})", status))
        }
        401 | 403 => Error::RepositoryInaccessible(format!("{} ({})", id.slug(), status)),
        _ => Error::SourceUnavailable(format!("GitHub API returned {}", status)),
    }
}

/// Byte counts → percentages rounded to two decimals.
fn language_shares(bytes: &BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    let total: u64 = bytes.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    bytes
        .iter()
        .map(|(lang, &n)| {
            let pct = (n as f64 * 100.0 / total as f64 * 100.0).round() / 100.0;
            (lang.clone(), pct)
        })
        .collect()
}

fn summarize_commit(record: &CommitRecord) -> CommitSummary {
    CommitSummary {
        sha: record.sha.chars().take(SHORT_SHA_LEN).collect(),
        message: record.commit.message.lines().next().unwrap_or("").to_string(),
        date: record.commit.author.as_ref().and_then(|a| a.date),
    }
}

/// Decode base64 file content (GitHub wraps it at 60 columns) and keep the
/// first [`SAMPLE_CONTENT_CHARS`] characters. Invalid UTF-8 is replaced.
pub fn decode_content(encoded: &str) -> std::result::Result<String, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
    Ok(String::from_utf8_lossy(&bytes)
        .chars()
        .take(SAMPLE_CONTENT_CHARS)
        .collect())
}

// ============ Fallback chain ============

/// Tries `primary`, and `fallback` only when the primary is unavailable.
pub struct FallbackSource {
    primary: Arc<dyn MetadataSource>,
    fallback: Arc<dyn MetadataSource>,
}

impl FallbackSource {
    pub fn new(primary: Arc<dyn MetadataSource>, fallback: Arc<dyn MetadataSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl MetadataSource for FallbackSource {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn fetch(&self, id: &RepositoryIdentifier) -> Result<RepositoryFacts> {
        match self.primary.fetch(id).await {
            Err(Error::SourceUnavailable(reason)) => {
                warn!(
                    repo = %id,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    reason = %reason,
                    "primary metadata source unavailable, falling back"
                );
                self.fallback.fetch(id).await
            }
            other => other,
        }
    }
}

/// The production chain: GitHub API first, public page scrape second.
pub fn source_from_config(config: &GithubConfig) -> anyhow::Result<Arc<dyn MetadataSource>> {
    let api = Arc::new(GitHubApiSource::new(config)?);
    let scrape = Arc::new(ScrapeSource::new(config)?);
    Ok(Arc::new(FallbackSource::new(api, scrape)))
}
