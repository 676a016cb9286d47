//! TOML configuration.
//!
//! Every component receives its settings from a [`Config`] value at
//! construction; secrets are never stored in the file itself, only the names
//! of the environment variables that hold them.
//!
//! ```toml
//! [db]
//! path = "./data/rtrust.sqlite"
//!
//! [github]
//! api_url = "https://api.github.com"
//! web_url = "https://github.com"
//! token_env = "GITHUB_TOKEN"
//!
//! [advisory]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7440"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
    /// Environment variable holding an optional API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            web_url: default_web_url(),
            token_env: default_token_env(),
            timeout_secs: default_github_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_web_url() -> String {
    "https://github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_github_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    format!("repo-trust/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdvisoryConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_advisory_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_advisory_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pins persona selection when set.
    #[serde(default)]
    pub persona_seed: Option<u64>,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            url: default_advisory_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_advisory_timeout_secs(),
            max_retries: default_max_retries(),
            persona_seed: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_advisory_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_advisory_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7440".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// Entries shown in the popularity report.
    #[serde(default = "default_popular_limit")]
    pub popular_limit: i64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            popular_limit: default_popular_limit(),
        }
    }
}

fn default_popular_limit() -> i64 {
    5
}

impl Config {
    /// Defaults for everything, database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/rtrust.sqlite"),
            },
            github: GithubConfig::default(),
            advisory: AdvisoryConfig::default(),
            server: ServerConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.github.timeout_secs == 0 {
        anyhow::bail!("github.timeout_secs must be > 0");
    }
    for (key, url) in [
        ("github.api_url", &config.github.api_url),
        ("github.web_url", &config.github.web_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", key, url);
        }
    }

    match config.advisory.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown advisory provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.advisory.timeout_secs == 0 {
        anyhow::bail!("advisory.timeout_secs must be > 0");
    }

    if config.report.popular_limit < 1 {
        anyhow::bail!("report.popular_limit must be >= 1");
    }

    Ok(config)
}
