//! The analysis pipeline.
//!
//! [`Analyzer::analyze`] is the single inbound operation:
//!
//! ```text
//! url ─▶ parse ─▶ cache lookup ──hit──▶ bump ─▶ outcome (cached)
//!                      │
//!                     miss
//!                      ▼
//!        fetch facts ─▶ score ─▶ advise ─▶ store ─▶ outcome (fresh)
//! ```
//!
//! Malformed URLs are rejected before any network call. The heuristic score
//! is computed before the advisory call starts and never depends on it.
//! When two requests race on the same unseen repository, the loser's
//! `DuplicateEntry` becomes a cache hit on the winner's entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::advisory::Advisor;
use crate::cache::{AnalysisCache, SqliteCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::github::{self, MetadataSource};
use crate::identifier::RepositoryIdentifier;
use crate::models::{CacheEntry, CombinedResult};
use crate::scoring;

/// Creator recorded when the caller supplies none.
pub const ANONYMOUS: &str = "anonymous";

/// What [`Analyzer::analyze`] hands back.
///
/// `analyzed_by` and `analyzed_at` describe the analysis that produced the
/// stored result, so on a cache hit they name the original creator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    #[serde(rename = "analysis")]
    pub result: CombinedResult,
    pub cached: bool,
    pub analyzed_by: String,
    pub analyzed_at: DateTime<Utc>,
    pub access_count: i64,
}

impl AnalysisOutcome {
    fn from_entry(entry: CacheEntry, cached: bool) -> Self {
        Self {
            result: entry.result,
            cached,
            analyzed_by: entry.created_by,
            analyzed_at: entry.created_at,
            access_count: entry.access_count,
        }
    }
}

pub struct Analyzer {
    source: Arc<dyn MetadataSource>,
    advisor: Advisor,
    cache: Arc<dyn AnalysisCache>,
}

impl Analyzer {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        advisor: Advisor,
        cache: Arc<dyn AnalysisCache>,
    ) -> Self {
        Self {
            source,
            advisor,
            cache,
        }
    }

    /// Wire up the production pipeline: GitHub API with scrape fallback,
    /// the configured advisory provider, and the SQLite cache.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source = github::source_from_config(&config.github)?;
        let advisor = Advisor::from_config(&config.advisory)?;
        let cache = Arc::new(SqliteCache::connect(config).await?);
        Ok(Self::new(source, advisor, cache))
    }

    pub fn cache(&self) -> &Arc<dyn AnalysisCache> {
        &self.cache
    }

    /// Analyze `repo_url` on behalf of `creator`, serving from cache when
    /// an entry exists.
    pub async fn analyze(&self, repo_url: &str, creator: &str) -> Result<AnalysisOutcome> {
        let id = RepositoryIdentifier::parse(repo_url)?;
        let creator = match creator.trim() {
            "" => ANONYMOUS,
            c => c,
        };

        if let Some(entry) = self.cache.lookup(&id).await? {
            let entry = self.cache.bump(&entry).await?;
            info!(repo = %id, access_count = entry.access_count, "cache hit");
            return Ok(AnalysisOutcome::from_entry(entry, true));
        }

        info!(repo = %id, source = self.source.name(), "cache miss, analyzing");
        let facts = self.source.fetch(&id).await?;

        let score = scoring::score(&facts);
        debug!(repo = %id, score = score.score, rating = %score.rating, "heuristic score");

        let advisory = self.advisor.advise(&facts, &id.canonical_url()).await;
        let result = CombinedResult::assemble(&facts, Some(score), advisory, Utc::now());

        match self.cache.store(&id, &result, creator).await {
            Ok(entry) => {
                info!(
                    repo = %id,
                    rating = %result.score.as_ref().map(|s| s.rating.as_str()).unwrap_or("-"),
                    by = creator,
                    "analysis stored"
                );
                Ok(AnalysisOutcome::from_entry(entry, false))
            }
            Err(Error::DuplicateEntry(_)) => {
                // A concurrent request stored first; serve its entry.
                let existing = self.cache.lookup(&id).await?.ok_or_else(|| {
                    Error::AnalysisFailed(format!("entry for {} vanished after duplicate insert", id))
                })?;
                let entry = self.cache.bump(&existing).await?;
                info!(repo = %id, "lost insert race, serving stored analysis");
                Ok(AnalysisOutcome::from_entry(entry, true))
            }
            Err(e) => Err(e),
        }
    }
}

/// Run the analyze command: one pipeline pass, printed for a terminal or as JSON.
pub async fn run_analyze(
    config: &Config,
    repo_url: &str,
    user: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let analyzer = Analyzer::from_config(config).await?;
    let outcome = analyzer.analyze(repo_url, user.unwrap_or("")).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_outcome(&outcome));
    }
    Ok(())
}

/// Human-readable summary of an outcome.
pub fn render_outcome(outcome: &AnalysisOutcome) -> String {
    let result = &outcome.result;
    let repo = &result.repository;
    let mut out = String::new();

    out.push_str(&format!("{}/{}\n", repo.owner, repo.name));
    if let Some(desc) = &repo.description {
        out.push_str(&format!("  {}\n", desc));
    }
    out.push('\n');
    out.push_str(&format!(
        "  Stars: {}  Forks: {}  Watchers: {}  Open issues: {}\n",
        repo.stars, repo.forks, repo.watchers, repo.open_issues
    ));
    out.push_str(&format!(
        "  Created: {}  Last updated: {}\n",
        repo.created_at.format("%Y-%m-%d"),
        repo.last_updated.format("%Y-%m-%d")
    ));

    match &result.score {
        Some(score) => {
            out.push_str(&format!("\n  Rating: {} ({:.1} / 5.0)\n", score.rating, score.score));
            for (factor, value) in score.breakdown.factors() {
                out.push_str(&format!("    {:<14} {:.2}\n", factor, value));
            }
            for (title, items) in [
                ("Strengths", &score.findings.strengths),
                ("Areas for improvement", &score.findings.areas_for_improvement),
                ("Recommendations", &score.findings.recommendations),
            ] {
                if items.is_empty() {
                    continue;
                }
                out.push_str(&format!("\n  {}:\n", title));
                for item in items {
                    out.push_str(&format!("    - {}\n", item));
                }
            }
        }
        None => out.push_str("\n  Rating: (not scored)\n"),
    }

    out.push_str(&format!(
        "\n  Advisory ({}, {}): {}\n",
        result.advisory.provider, result.advisory.persona, result.advisory.grade
    ));
    for line in result.advisory.text.lines() {
        out.push_str(&format!("    {}\n", line));
    }

    out.push_str(&format!(
        "\n  {} by {} at {} (accessed {} time{})\n",
        if outcome.cached { "Cached analysis" } else { "Analyzed" },
        outcome.analyzed_by,
        outcome.analyzed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        outcome.access_count,
        if outcome.access_count == 1 { "" } else { "s" }
    ));
    out
}
