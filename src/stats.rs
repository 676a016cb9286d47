//! Popularity report.
//!
//! How many repositories have been analyzed, and which ones are looked up
//! most. Served by `rtrust stats` and `GET /api/stats`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{AnalysisCache, SqliteCache};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularEntry {
    pub repo_url: String,
    pub access_count: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityReport {
    pub total_analyses: i64,
    pub most_popular: Vec<PopularEntry>,
}

/// Build the report from any cache backend.
pub async fn popularity_report(cache: &dyn AnalysisCache, limit: i64) -> Result<PopularityReport> {
    let total_analyses = cache.count().await?;
    let most_popular = cache
        .most_accessed(limit)
        .await?
        .into_iter()
        .map(|e| PopularEntry {
            repo_url: e.repo_url,
            access_count: e.access_count,
            created_by: e.created_by,
            created_at: e.created_at,
        })
        .collect();

    Ok(PopularityReport {
        total_analyses,
        most_popular,
    })
}

/// Run the stats command: query the database and print the report.
pub async fn run_stats(config: &Config, limit: Option<i64>, json: bool) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(config.report.popular_limit);
    if limit < 1 {
        anyhow::bail!("--limit must be >= 1");
    }

    let cache = SqliteCache::connect(config).await?;
    let report = popularity_report(&cache, limit).await?;
    cache.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report, Utc::now()));
    }
    Ok(())
}

/// Plain-text table for terminals.
pub fn render_report(report: &PopularityReport, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str("repo-trust: analysis stats\n");
    out.push_str("==========================\n\n");
    out.push_str(&format!("  Total analyses: {}\n", report.total_analyses));

    if report.most_popular.is_empty() {
        out.push_str("\n  No repositories analyzed yet.\n");
        return out;
    }

    out.push_str("\n  Most popular:\n");
    out.push_str(&format!(
        "  {:<48} {:>6}  {:<16} {}\n",
        "REPOSITORY", "HITS", "FIRST BY", "ANALYZED"
    ));
    out.push_str(&format!("  {}\n", "-".repeat(86)));
    for e in &report.most_popular {
        out.push_str(&format!(
            "  {:<48} {:>6}  {:<16} {}\n",
            e.repo_url,
            e.access_count,
            e.created_by,
            format_relative(now, e.created_at)
        ));
    }
    out
}

/// "3 hours ago" for recent times, an absolute date beyond 30 days.
fn format_relative(now: DateTime<Utc>, ts: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_iso(ts)
    }
}

fn format_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
