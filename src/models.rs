//! Core data models used throughout repo-trust.
//!
//! These types represent the facts, scores, advisory opinions, and cache
//! entries that flow through the analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identifier::RepositoryIdentifier;

/// Which metadata source produced a [`RepositoryFacts`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactsSource {
    Api,
    Scrape,
}

/// A sampled root-level file: path plus at most 1000 characters of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSample {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributorSummary {
    pub login: String,
    pub contributions: u64,
}

/// Point-in-time snapshot of repository signals, the sole input to scoring.
///
/// Built once per cache miss and never mutated. `fetched_at` is the
/// reference "now" for every age computation, which keeps
/// [`crate::scoring::score`] a pure function of this value.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryFacts {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub tags: u64,
    pub collaborators: u64,
    pub contributors: u64,
    pub top_contributors: Vec<ContributorSummary>,
    /// Language name → share of the codebase in percent.
    pub languages: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of commits in the sampled page (at most 30).
    pub total_commits: u64,
    pub is_single_commit: bool,
    pub recent_commits: Vec<CommitSummary>,
    pub files: Vec<FileSample>,
    pub fetched_at: DateTime<Utc>,
    pub source: FactsSource,
}

impl RepositoryFacts {
    /// All-zero facts for `id`, with every timestamp set to `now`.
    ///
    /// Used as the starting point by the scrape fallback and by tests.
    pub fn empty(id: &RepositoryIdentifier, now: DateTime<Utc>, source: FactsSource) -> Self {
        Self {
            owner: id.owner().to_string(),
            name: id.name().to_string(),
            description: None,
            stars: 0,
            forks: 0,
            watchers: 0,
            open_issues: 0,
            tags: 0,
            collaborators: 0,
            contributors: 0,
            top_contributors: Vec::new(),
            languages: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            total_commits: 0,
            is_single_commit: false,
            recent_commits: Vec::new(),
            files: Vec::new(),
            fetched_at: now,
            source,
        }
    }
}

/// Categorical rating shared by the heuristic engine and the advisory grade.
///
/// Declaration order is the grade-extraction precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    Good,
    Average,
    Poor,
    Bad,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::Excellent,
        Rating::Good,
        Rating::Average,
        Rating::Poor,
        Rating::Bad,
    ];

    /// Map a normalized 0–5 score onto a rating. Thresholds are inclusive.
    pub fn from_score(score: f64) -> Self {
        if score >= 4.5 {
            Rating::Excellent
        } else if score >= 3.5 {
            Rating::Good
        } else if score >= 2.5 {
            Rating::Average
        } else if score >= 1.5 {
            Rating::Poor
        } else {
            Rating::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Average => "Average",
            Rating::Poor => "Poor",
            Rating::Bad => "Bad",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six factor sub-scores, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub documentation: f64,
    pub structure: f64,
    pub engagement: f64,
    pub maintenance: f64,
    pub issues: f64,
    pub maturity: f64,
}

impl ScoreBreakdown {
    pub const FACTOR_COUNT: usize = 6;

    pub fn factors(&self) -> [(&'static str, f64); Self::FACTOR_COUNT] {
        [
            ("documentation", self.documentation),
            ("structure", self.structure),
            ("engagement", self.engagement),
            ("maintenance", self.maintenance),
            ("issues", self.issues),
            ("maturity", self.maturity),
        ]
    }
}

/// Advisory text produced alongside each scoring branch. Not scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicScore {
    pub rating: Rating,
    /// Normalized score in `[0.0, 5.0]`, one decimal.
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub findings: Findings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResult {
    pub text: String,
    pub grade: Rating,
    pub persona: String,
    pub provider: String,
    /// `true` when the outbound call failed and `text` is the sentinel.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub tags: u64,
    pub collaborators: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitActivity {
    pub total_commits: u64,
    pub single_commit: bool,
    pub recent_commits: Vec<CommitSummary>,
}

/// The cached unit: facts-derived summary, heuristic score, and advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub repository: RepositorySummary,
    pub languages: BTreeMap<String, f64>,
    pub commit_activity: CommitActivity,
    pub contributors: Vec<ContributorSummary>,
    /// Absent in advisory-only variants.
    pub score: Option<HeuristicScore>,
    pub advisory: AdvisoryResult,
    pub source: FactsSource,
    pub analysis_date: DateTime<Utc>,
}

impl CombinedResult {
    /// Merge a facts snapshot with its score and advisory opinion.
    pub fn assemble(
        facts: &RepositoryFacts,
        score: Option<HeuristicScore>,
        advisory: AdvisoryResult,
        analysis_date: DateTime<Utc>,
    ) -> Self {
        Self {
            repository: RepositorySummary {
                owner: facts.owner.clone(),
                name: facts.name.clone(),
                description: facts.description.clone(),
                stars: facts.stars,
                forks: facts.forks,
                watchers: facts.watchers,
                open_issues: facts.open_issues,
                tags: facts.tags,
                collaborators: facts.collaborators,
                created_at: facts.created_at,
                last_updated: facts.updated_at,
            },
            languages: facts.languages.clone(),
            commit_activity: CommitActivity {
                total_commits: facts.total_commits,
                single_commit: facts.is_single_commit,
                recent_commits: facts.recent_commits.clone(),
            },
            contributors: facts.top_contributors.clone(),
            score,
            advisory,
            source: facts.source,
            analysis_date,
        }
    }
}

/// One row of the analysis cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub identifier: RepositoryIdentifier,
    pub repo_url: String,
    pub repo_hash: String,
    pub result: CombinedResult,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub access_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_thresholds_inclusive() {
        assert_eq!(Rating::from_score(5.0), Rating::Excellent);
        assert_eq!(Rating::from_score(4.5), Rating::Excellent);
        assert_eq!(Rating::from_score(4.49), Rating::Good);
        assert_eq!(Rating::from_score(3.5), Rating::Good);
        assert_eq!(Rating::from_score(3.49), Rating::Average);
        assert_eq!(Rating::from_score(2.5), Rating::Average);
        assert_eq!(Rating::from_score(1.5), Rating::Poor);
        assert_eq!(Rating::from_score(1.49), Rating::Bad);
        assert_eq!(Rating::from_score(0.0), Rating::Bad);
    }

    #[test]
    fn test_rating_serializes_as_word() {
        let json = serde_json::to_string(&Rating::Excellent).unwrap();
        assert_eq!(json, "\"Excellent\"");
    }
}
