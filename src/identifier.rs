//! Repository identifiers.
//!
//! Every analysis is keyed by a [`RepositoryIdentifier`]: the `(owner, name)`
//! pair extracted from whatever URL the caller typed. Trailing slashes, a
//! `.git` suffix, a missing scheme, `www.` and mixed case all collapse onto
//! the same identifier and therefore the same cache entry.
//!
//! ```rust
//! use repo_trust::identifier::RepositoryIdentifier;
//!
//! let a = RepositoryIdentifier::parse("https://github.com/Rust-Lang/Cargo/").unwrap();
//! let b = RepositoryIdentifier::parse("github.com/rust-lang/cargo.git").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.canonical_url(), "https://github.com/rust-lang/cargo");
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

const GITHUB_HOST: &str = "github.com";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryIdentifier {
    owner: String,
    name: String,
}

impl RepositoryIdentifier {
    /// Parse a repository URL into its canonical identifier.
    ///
    /// Rejects anything that does not reduce to exactly two path segments
    /// on the GitHub host. No network access happens here.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidUrl("empty url".to_string()));
        }

        let (host, path) = split_host_and_path(trimmed)?;

        let host = host.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if host != GITHUB_HOST {
            return Err(Error::InvalidUrl(format!(
                "unsupported host '{}' in {}",
                host, trimmed
            )));
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() != 2 {
            return Err(Error::InvalidUrl(format!(
                "expected /<owner>/<name>, got {}",
                trimmed
            )));
        }

        let owner = segments[0].to_ascii_lowercase();
        let name = segments[1].to_ascii_lowercase();
        let name = name.strip_suffix(".git").unwrap_or(&name);

        validate_segment(&owner, trimmed)?;
        validate_segment(name, trimmed)?;

        Ok(Self {
            owner,
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn canonical_url(&self) -> String {
        format!("https://{}/{}/{}", GITHUB_HOST, self.owner, self.name)
    }

    /// Fixed-width cache key: lower-case hex SHA-256 of the canonical URL.
    pub fn repo_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_url().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RepositoryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Split `input` into `(host, path)`, dropping scheme, query and fragment.
fn split_host_and_path(input: &str) -> Result<(&str, &str)> {
    // SSH remote: git@github.com:owner/name.git
    if let Some(rest) = input.strip_prefix("git@") {
        return rest
            .split_once(':')
            .ok_or_else(|| Error::InvalidUrl(format!("malformed ssh remote: {}", input)));
    }

    let without_scheme = match input.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "https" && scheme != "http" {
                return Err(Error::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    scheme, input
                )));
            }
            rest
        }
        None => input,
    };

    let without_fragment = without_scheme
        .split_once('#')
        .map_or(without_scheme, |(before, _)| before);
    let without_query = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(before, _)| before);

    Ok(without_query
        .split_once('/')
        .unwrap_or((without_query, "")))
}

fn validate_segment(segment: &str, original: &str) -> Result<()> {
    let valid_chars = segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if segment.is_empty() || segment == "." || segment == ".." || !valid_chars {
        return Err(Error::InvalidUrl(format!(
            "invalid path segment '{}' in {}",
            segment, original
        )));
    }
    Ok(())
}
