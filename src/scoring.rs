//! Deterministic heuristic scoring.
//!
//! [`score`] maps a [`RepositoryFacts`] snapshot onto six independent
//! factors, each capped at 1.0, and normalizes their sum onto a 0–5 scale:
//!
//! | Factor | Driven by |
//! |--------|-----------|
//! | documentation | root README presence and length |
//! | structure | dependency manifest, `.gitignore`, test paths |
//! | engagement | stars, forks, watchers, collaborators, tags, commit frequency |
//! | maintenance | commit frequency and days since last update |
//! | issues | open issue count |
//! | maturity | repository age |
//!
//! The function is total over its input: all-zero facts, timestamps in the
//! future, and a zero-day-old repository all produce a valid score. Ages are
//! measured against `facts.fetched_at`, never the wall clock, so identical
//! facts always yield bit-identical output.

use chrono::{DateTime, Utc};

use crate::models::{Findings, HeuristicScore, Rating, RepositoryFacts, ScoreBreakdown};

/// Content length above which a README counts as comprehensive.
const README_DETAILED_CHARS: usize = 500;

const README_NAMES: &[&str] = &[
    "readme",
    "readme.md",
    "readme.markdown",
    "readme.rst",
    "readme.txt",
];

const MANIFEST_NAMES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "pipfile",
    "cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "gemfile",
    "composer.json",
    "mix.exs",
    "pubspec.yaml",
    "cmakelists.txt",
    "makefile",
];

const MANIFEST_EXTENSIONS: &[&str] = &[".toml", ".txt", ".gemspec", ".csproj", ".cabal"];

/// Score a facts snapshot.
pub fn score(facts: &RepositoryFacts) -> HeuristicScore {
    let mut findings = Findings::default();

    let age_days = days_between(facts.fetched_at, facts.created_at);
    let days_since_update = days_between(facts.fetched_at, facts.updated_at);
    let frequency = commit_frequency(facts.total_commits, age_days);

    let breakdown = ScoreBreakdown {
        documentation: documentation_factor(facts, &mut findings),
        structure: structure_factor(facts, &mut findings),
        engagement: engagement_factor(facts, frequency, &mut findings),
        maintenance: maintenance_factor(frequency, days_since_update, &mut findings),
        issues: issues_factor(facts.open_issues, &mut findings),
        maturity: maturity_factor(age_days, &mut findings),
    };

    if facts.is_single_commit {
        findings
            .areas_for_improvement
            .push("History consists of a single commit".to_string());
    }

    let score = normalize(&breakdown);
    HeuristicScore {
        rating: Rating::from_score(score),
        score,
        breakdown,
        findings,
    }
}

/// Whole days from `earlier` to `later`, clamped at zero.
fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_days().max(0)
}

/// Commits per 30 days over the repository lifetime (1-day floor).
fn commit_frequency(total_commits: u64, age_days: i64) -> f64 {
    (total_commits as f64 * 30.0) / age_days.max(1) as f64
}

/// Sum of factors over the maximum, scaled to 0–5 and rounded to one
/// decimal, ties upward. Computed in integer hundredths so no float drift
/// can cross a category threshold.
fn normalize(breakdown: &ScoreBreakdown) -> f64 {
    let hundredths: i64 = breakdown
        .factors()
        .iter()
        .map(|(_, v)| (v * 100.0).round() as i64)
        .sum();
    // total / n * 5 in tenths == hundredths / 2n
    let divisor = 2 * ScoreBreakdown::FACTOR_COUNT as i64;
    let tenths = (hundredths * 2 + divisor) / (2 * divisor);
    tenths as f64 / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn capped(value: f64) -> f64 {
    round2(value.clamp(0.0, 1.0))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn documentation_factor(facts: &RepositoryFacts, findings: &mut Findings) -> f64 {
    let readme = facts.files.iter().find(|f| {
        !f.path.contains('/') && README_NAMES.contains(&f.path.to_ascii_lowercase().as_str())
    });

    match readme {
        Some(file) if file.content.chars().count() > README_DETAILED_CHARS => {
            findings
                .strengths
                .push("Comprehensive README documentation".to_string());
            1.0
        }
        Some(_) => {
            findings
                .areas_for_improvement
                .push("README could be more detailed".to_string());
            findings.recommendations.push(
                "Expand README with installation, usage, and contribution guidelines".to_string(),
            );
            0.5
        }
        None => {
            findings
                .areas_for_improvement
                .push("Missing README documentation".to_string());
            findings
                .recommendations
                .push("Add a README.md file with project documentation".to_string());
            0.0
        }
    }
}

fn is_manifest(path: &str) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    MANIFEST_NAMES.contains(&name.as_str())
        || MANIFEST_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn structure_factor(facts: &RepositoryFacts, findings: &mut Findings) -> f64 {
    let has_manifest = facts.files.iter().any(|f| is_manifest(&f.path));
    let has_gitignore = facts.files.iter().any(|f| f.path == ".gitignore");
    let has_tests = facts
        .files
        .iter()
        .any(|f| f.path.to_ascii_lowercase().contains("test"));

    let mut total = 0.0;
    if has_manifest {
        total += 0.4;
        findings
            .strengths
            .push("Dependency management files present".to_string());
    } else {
        findings.recommendations.push(
            "Add dependency management files (requirements.txt/package.json)".to_string(),
        );
    }

    if has_gitignore {
        total += 0.3;
        findings
            .strengths
            .push("Proper git configuration with .gitignore".to_string());
    }

    if has_tests {
        total += 0.3;
        findings
            .strengths
            .push("Testing infrastructure present".to_string());
    } else {
        findings
            .areas_for_improvement
            .push("No tests found".to_string());
        findings
            .recommendations
            .push("Add unit tests to ensure code quality".to_string());
    }

    capped(total)
}

fn engagement_factor(facts: &RepositoryFacts, frequency: f64, findings: &mut Findings) -> f64 {
    let terms = [
        (facts.stars as f64 / 100.0).min(0.3),
        (facts.forks as f64 / 50.0).min(0.2),
        (facts.watchers as f64 / 50.0).min(0.15),
        (facts.collaborators as f64 / 5.0).min(0.15),
        (facts.tags as f64 / 10.0).min(0.1),
        (frequency / 20.0).min(0.1),
    ];
    let engagement = capped(terms.iter().sum());

    let mut details = Vec::new();
    if facts.stars > 0 {
        details.push(format!("{} stars", facts.stars));
    }
    if facts.forks > 0 {
        details.push(format!("{} forks", facts.forks));
    }
    if facts.watchers > 0 {
        details.push(format!("{} watchers", facts.watchers));
    }
    if !details.is_empty() {
        findings
            .strengths
            .push(format!("Community engagement: {}", details.join(", ")));
    }

    if engagement < 0.3 {
        findings
            .areas_for_improvement
            .push("Could benefit from more community engagement".to_string());
        findings.recommendations.push(
            "Consider promoting the repository to attract more contributors".to_string(),
        );
    }

    engagement
}

fn maintenance_factor(frequency: f64, days_since_update: i64, findings: &mut Findings) -> f64 {
    let frequency_component = if frequency >= 10.0 {
        0.6
    } else if frequency >= 4.0 {
        0.4
    } else if frequency >= 1.0 {
        0.2
    } else {
        0.1
    };

    let recency_component = if days_since_update < 7 {
        0.4
    } else if days_since_update < 30 {
        0.3
    } else if days_since_update < 90 {
        0.2
    } else {
        0.0
    };

    let maintenance = capped(frequency_component + recency_component);

    if maintenance >= 0.8 {
        findings
            .strengths
            .push("Highly active maintenance with regular commits".to_string());
    } else if maintenance >= 0.5 {
        findings
            .strengths
            .push("Regular maintenance activity".to_string());
    } else if maintenance >= 0.3 {
        findings
            .areas_for_improvement
            .push("Repository could benefit from more frequent updates".to_string());
    } else {
        findings
            .areas_for_improvement
            .push("Repository appears to be unmaintained".to_string());
    }

    maintenance
}

fn issues_factor(open_issues: u64, findings: &mut Findings) -> f64 {
    match open_issues {
        0 => 1.0,
        1..=9 => 0.8,
        10..=49 => 0.6,
        n => {
            findings
                .areas_for_improvement
                .push(format!("Large number of open issues ({})", n));
            0.4
        }
    }
}

fn maturity_factor(age_days: i64, findings: &mut Findings) -> f64 {
    if age_days <= 7 {
        findings
            .areas_for_improvement
            .push("Repository is very new with limited commit history".to_string());
        findings
            .recommendations
            .push("Continue developing the project and making regular commits".to_string());
        0.2
    } else if age_days <= 30 {
        findings
            .areas_for_improvement
            .push("Repository is relatively new".to_string());
        0.6
    } else {
        findings
            .strengths
            .push("Repository has established history".to_string());
        1.0
    }
}
