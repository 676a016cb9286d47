//! Advisory opinion layer.
//!
//! Asks an external text-generation service for a short natural-language
//! assessment of a repository and extracts a coarse [`Rating`] from the first
//! characters of the reply. The opinion is best-effort: any failure degrades
//! to a fixed sentinel result graded `Average`, and the heuristic score is
//! never influenced by anything in this module.
//!
//! # Providers
//!
//! - **[`OpenAIProvider`]**: any OpenAI-compatible `POST /chat/completions`
//!   endpoint, with retry and exponential backoff on 429 / 5xx / network errors.
//! - **[`DisabledProvider`]**: always fails; every opinion is the sentinel.
//!
//! # Personas
//!
//! Each request is framed by one reviewer persona drawn uniformly from
//! [`PERSONAS`] using the advisor's injected [`StdRng`]. Seed the generator
//! (`advisory.persona_seed`) to pin the persona in tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AdvisoryConfig;
use crate::models::{AdvisoryResult, Rating, RepositoryFacts};

/// Text stored when the advisory call fails.
pub const ADVISORY_UNAVAILABLE: &str = "Advisory opinion unavailable.";

/// Number of leading characters scanned for a grade token.
pub const GRADE_WINDOW_CHARS: usize = 25;

/// Characters of each sampled file embedded in the prompt.
const PROMPT_FILE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    pub name: &'static str,
    pub framing: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        name: "architect",
        framing: "You are a senior software architect performing code reviews.",
    },
    Persona {
        name: "maintainer",
        framing: "You are a long-time open-source maintainer who has triaged thousands of projects.",
    },
    Persona {
        name: "security",
        framing: "You are a security-minded reviewer deciding whether a dependency can be trusted.",
    },
    Persona {
        name: "tech-lead",
        framing: "You are a pragmatic tech lead evaluating a library for production use.",
    },
];

/// Fixed examples that anchor the model's grade distribution.
pub const CALIBRATION_EXAMPLES: &[(&str, Rating)] = &[
    ("torvalds/linux", Rating::Excellent),
    ("tokio-rs/tokio", Rating::Excellent),
    ("pallets/flask", Rating::Good),
    ("a weekend side project with a README and a few dozen commits", Rating::Average),
    ("an abandoned fork with no README and no tests", Rating::Poor),
    ("a single-commit upload of generated code with no description", Rating::Bad),
];

// ============ Grade extraction ============

/// Extract a grade from the leading characters of a free-form reply.
///
/// Scans the first [`GRADE_WINDOW_CHARS`] characters, case-insensitively,
/// for the rating words in precedence order (Excellent, Good, Average, Poor,
/// Bad). Defaults to `Average` when none appear.
pub fn extract_grade(text: &str) -> Rating {
    let window: String = text
        .chars()
        .take(GRADE_WINDOW_CHARS)
        .collect::<String>()
        .to_lowercase();

    Rating::ALL
        .into_iter()
        .find(|rating| window.contains(&rating.as_str().to_lowercase()))
        .unwrap_or(Rating::Average)
}

// ============ Prompt construction ============

pub fn system_prompt(persona: &Persona) -> String {
    let grades = Rating::ALL
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{} Start your answer with exactly one grade word ({}), then give key strengths, \
         areas for improvement, and specific recommendations in a few short paragraphs.",
        persona.framing, grades
    )
}

/// Build the user prompt embedding the facts and calibration examples.
pub fn build_prompt(facts: &RepositoryFacts, repo_url: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("Calibration examples:\n");
    for (example, grade) in CALIBRATION_EXAMPLES {
        prompt.push_str(&format!("- {} => {}\n", example, grade));
    }

    prompt.push_str(&format!("\nAnalyze this GitHub repository: {}\n", repo_url));
    prompt.push_str(&format!("Name: {}/{}\n", facts.owner, facts.name));
    prompt.push_str(&format!(
        "Description: {}\n",
        facts.description.as_deref().unwrap_or("(none)")
    ));
    prompt.push_str(&format!("Stars: {}\n", facts.stars));
    prompt.push_str(&format!("Forks: {}\n", facts.forks));
    prompt.push_str(&format!("Watchers: {}\n", facts.watchers));
    prompt.push_str(&format!("Open issues: {}\n", facts.open_issues));
    prompt.push_str(&format!("Tags: {}\n", facts.tags));
    prompt.push_str(&format!("Collaborators: {}\n", facts.collaborators));
    prompt.push_str(&format!("Contributors: {}\n", facts.contributors));
    prompt.push_str(&format!(
        "Sampled commits: {}{}\n",
        facts.total_commits,
        if facts.is_single_commit {
            " (single commit)"
        } else {
            ""
        }
    ));
    prompt.push_str(&format!(
        "Created: {}\n",
        facts.created_at.format("%Y-%m-%d")
    ));
    prompt.push_str(&format!(
        "Last updated: {}\n",
        facts.updated_at.format("%Y-%m-%d")
    ));

    if !facts.languages.is_empty() {
        let langs = facts
            .languages
            .iter()
            .map(|(lang, pct)| format!("{} {:.1}%", lang, pct))
            .collect::<Vec<_>>()
            .join(", ");
        prompt.push_str(&format!("Languages: {}\n", langs));
    }

    if !facts.files.is_empty() {
        prompt.push_str("\nCode samples:\n");
        for file in &facts.files {
            let excerpt: String = file.content.chars().take(PROMPT_FILE_CHARS).collect();
            prompt.push_str(&format!("File: {}\n{}...\n\n", file.path, excerpt));
        }
    }

    prompt
}

// ============ Providers ============

/// A text-completion backend.
#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    /// Short identifier recorded in [`AdvisoryResult::provider`].
    fn name(&self) -> &str;

    /// Send one system + user prompt pair and return the raw reply.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

pub struct DisabledProvider;

#[async_trait]
impl AdvisoryProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        bail!("Advisory provider is disabled")
    }
}

/// Chat-completions provider for OpenAI and compatible endpoints.
pub struct OpenAIProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAIProvider {
    /// Build from config. A missing API key is not an error here; calls
    /// fail later and degrade to the sentinel.
    pub fn new(config: &AdvisoryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "advisory API key not set; opinions will fall back to the sentinel"
            );
        }
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AdvisoryProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("advisory API key not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.url))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "advisory API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("advisory API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("advisory call failed after retries")))
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

/// Instantiate the provider named in config.
pub fn create_provider(config: &AdvisoryConfig) -> Result<Arc<dyn AdvisoryProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown advisory provider: {}", other),
    }
}

// ============ Advisor ============

/// Produces [`AdvisoryResult`]s; never fails.
pub struct Advisor {
    provider: Arc<dyn AdvisoryProvider>,
    rng: Mutex<StdRng>,
}

impl Advisor {
    pub fn new(provider: Arc<dyn AdvisoryProvider>, rng: StdRng) -> Self {
        Self {
            provider,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &AdvisoryConfig) -> Result<Self> {
        let rng = match config.persona_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self::new(create_provider(config)?, rng))
    }

    /// Draw the next persona uniformly from [`PERSONAS`].
    pub fn pick_persona(&self) -> &'static Persona {
        let mut rng = self.rng.lock().unwrap_or_else(|poison| poison.into_inner());
        &PERSONAS[rng.random_range(0..PERSONAS.len())]
    }

    pub async fn advise(&self, facts: &RepositoryFacts, repo_url: &str) -> AdvisoryResult {
        let persona = self.pick_persona();
        let system = system_prompt(persona);
        let prompt = build_prompt(facts, repo_url);
        debug!(persona = persona.name, provider = self.provider.name(), "requesting advisory opinion");

        match self.provider.complete(&system, &prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                AdvisoryResult {
                    grade: extract_grade(&text),
                    text,
                    persona: persona.name.to_string(),
                    provider: self.provider.name().to_string(),
                    fallback: false,
                }
            }
            Ok(_) => {
                warn!(repo = repo_url, "advisory provider returned an empty reply");
                self.sentinel(persona)
            }
            Err(e) => {
                warn!(repo = repo_url, error = %e, "advisory call failed");
                self.sentinel(persona)
            }
        }
    }

    fn sentinel(&self, persona: &Persona) -> AdvisoryResult {
        AdvisoryResult {
            text: ADVISORY_UNAVAILABLE.to_string(),
            grade: Rating::Average,
            persona: persona.name.to_string(),
            provider: self.provider.name().to_string(),
            fallback: true,
        }
    }
}
