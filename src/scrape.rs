//! HTML-scrape fallback for repository metadata.
//!
//! Used when the REST API is unreachable or rate-limited. The public
//! repository page yields a reduced snapshot: stars, forks, language shares,
//! creation and update timestamps, contributor count and the description.
//! Every field is optional on the page; a missing element leaves the zero /
//! empty / snapshot-time default in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::github::MetadataSource;
use crate::identifier::RepositoryIdentifier;
use crate::models::{FactsSource, RepositoryFacts};

const COUNT: &str = r"([0-9][0-9.,]*\s*[kKmM]?)";

static STARS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        counter_after(r#"id="repo-stars-counter-star"[^>]*>"#),
        counter_before("stars"),
    ]
});

static FORKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        counter_after(r#"id="repo-network-counter"[^>]*>"#),
        counter_before("forks"),
    ]
});

static CONTRIBUTORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![counter_after(
        r#"Contributors\s*<span[^>]*class="Counter[^"]*"[^>]*>"#,
    )]
});

static LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<span class="color-fg-default text-bold mr-1">([^<]+)</span>\s*<span>([0-9]+(?:\.[0-9]+)?)%</span>"#,
    )
    .unwrap()
});

static RELATIVE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<relative-time[^>]*\sdatetime="([^"]+)""#).unwrap());

static DESCRIPTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"<meta\s+property="og:description"\s+content="([^"]*)""#).unwrap(),
        Regex::new(r#"<meta\s+name="description"\s+content="([^"]*)""#).unwrap(),
    ]
});

fn counter_after(prefix: &str) -> Regex {
    Regex::new(&format!(r"{}\s*{}\s*<", prefix, COUNT)).unwrap()
}

fn counter_before(label: &str) -> Regex {
    Regex::new(&format!(r"(?i){}\s*</strong>\s*{}", COUNT, label)).unwrap()
}

pub struct ScrapeSource {
    client: reqwest::Client,
    web_url: String,
}

impl ScrapeSource {
    pub fn new(config: &GithubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            web_url: config.web_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for ScrapeSource {
    fn name(&self) -> &str {
        "github-page"
    }

    async fn fetch(&self, id: &RepositoryIdentifier) -> Result<RepositoryFacts> {
        let url = format!("{}/{}/{}", self.web_url, id.owner(), id.name());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("repository page: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::RepositoryNotFound(id.slug()));
        }
        if !status.is_success() {
            return Err(Error::SourceUnavailable(format!(
                "repository page returned {}",
                status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("repository page: {}", e)))?;
        debug!(repo = %id, bytes = html.len(), "fetched repository page");

        let facts = parse_page(&html, id, Utc::now());
        info!(repo = %id, stars = facts.stars, "collected facts from repository page");
        Ok(facts)
    }
}

/// Extract a facts snapshot from repository page HTML.
///
/// `now` becomes `fetched_at` and the default for both timestamps.
pub fn parse_page(html: &str, id: &RepositoryIdentifier, now: DateTime<Utc>) -> RepositoryFacts {
    let mut facts = RepositoryFacts::empty(id, now, FactsSource::Scrape);

    facts.stars = first_count(&STARS, html).unwrap_or(0);
    facts.forks = first_count(&FORKS, html).unwrap_or(0);
    facts.contributors = first_count(&CONTRIBUTORS, html).unwrap_or(0);

    for cap in LANGUAGE.captures_iter(html) {
        if let Ok(pct) = cap[2].parse::<f64>() {
            facts.languages.insert(cap[1].trim().to_string(), pct);
        }
    }

    let mut stamps: Vec<DateTime<Utc>> = RELATIVE_TIME
        .captures_iter(html)
        .filter_map(|cap| DateTime::parse_from_rfc3339(&cap[1]).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .collect();
    stamps.sort();
    if let (Some(first), Some(last)) = (stamps.first(), stamps.last()) {
        facts.created_at = *first;
        facts.updated_at = *last;
    }

    facts.description = DESCRIPTION
        .iter()
        .find_map(|re| re.captures(html))
        .map(|cap| unescape_html(cap[1].trim()))
        .filter(|d| !d.is_empty());

    facts
}

fn first_count(patterns: &[Regex], html: &str) -> Option<u64> {
    patterns
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|cap| parse_count(&cap[1]))
}

/// Parse a human-formatted count: `"1,234"`, `"1.2k"`, `"3m"`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"
<html><head>
<meta property="og:description" content="Widgets &amp; gadgets for everyone">
</head><body>
<span id="repo-stars-counter-star" aria-label="1234 users starred this repository" class="Counter">1.2k</span>
<span id="repo-network-counter" class="Counter">87</span>
<a href="/acme/widget/graphs/contributors">Contributors <span title="14" class="Counter ">14</span></a>
<li><span class="color-fg-default text-bold mr-1">Rust</span>
<span>92.3%</span></li>
<li><span class="color-fg-default text-bold mr-1">Shell</span> <span>7.7%</span></li>
<relative-time class="no-wrap" datetime="2024-03-05T10:00:00Z">Mar 5</relative-time>
<relative-time datetime="2021-06-01T08:30:00Z">Jun 1, 2021</relative-time>
<relative-time datetime="2023-11-20T00:00:00Z">Nov 20</relative-time>
</body></html>
"#;

    fn id() -> RepositoryIdentifier {
        RepositoryIdentifier::parse("github.com/acme/widget").unwrap()
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1.2k"), Some(1200));
        assert_eq!(parse_count("3m"), Some(3_000_000));
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("  42 "), Some(42));
        assert_eq!(parse_count("2.5K"), Some(2500));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("k"), None);
        assert_eq!(parse_count("lots"), None);
    }

    #[test]
    fn test_parse_page_extracts_fields() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let facts = parse_page(PAGE, &id(), now);

        assert_eq!(facts.source, FactsSource::Scrape);
        assert_eq!(facts.stars, 1200);
        assert_eq!(facts.forks, 87);
        assert_eq!(facts.contributors, 14);
        assert_eq!(facts.languages.len(), 2);
        assert_eq!(facts.languages["Rust"], 92.3);
        assert_eq!(facts.languages["Shell"], 7.7);
        assert_eq!(
            facts.created_at,
            Utc.with_ymd_and_hms(2021, 6, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(
            facts.updated_at,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
        );
        assert_eq!(facts.description.as_deref(), Some("Widgets & gadgets for everyone"));
        assert_eq!(facts.fetched_at, now);
    }

    #[test]
    fn test_parse_page_defaults_when_elements_missing() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let facts = parse_page("<html><body>nothing here</body></html>", &id(), now);

        assert_eq!(facts.stars, 0);
        assert_eq!(facts.forks, 0);
        assert_eq!(facts.contributors, 0);
        assert!(facts.languages.is_empty());
        assert_eq!(facts.created_at, now);
        assert_eq!(facts.updated_at, now);
        assert_eq!(facts.description, None);
        assert_eq!(facts.owner, "acme");
        assert_eq!(facts.name, "widget");
    }

    #[test]
    fn test_parse_page_strong_counter_layout() {
        let html = "<a><strong>3m</strong> stars</a><a><strong>1,234</strong>\n forks</a>";
        let facts = parse_page(html, &id(), Utc::now());
        assert_eq!(facts.stars, 3_000_000);
        assert_eq!(facts.forks, 1234);
    }
}
