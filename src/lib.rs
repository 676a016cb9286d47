//! # repo-trust
//!
//! Trust and quality ratings for public GitHub repositories.
//!
//! Given a repository URL, repo-trust collects a snapshot of repository
//! metadata, computes a deterministic heuristic score from it, asks a
//! language model for an advisory opinion, and caches the combined result
//! so repeat lookups are cheap.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ GitHub API   │──▶│  Scoring    │──▶│  SQLite   │
//! │ (scrape f/b) │   │ + Advisory  │   │  cache    │
//! └──────────────┘   └─────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │ (rtrust) │       │   API    │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rtrust init
//! rtrust analyze https://github.com/tokio-rs/tokio
//! rtrust stats
//! rtrust serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`identifier`] | URL parsing and cache keys |
//! | [`github`] | Metadata sources and the API → scrape fallback chain |
//! | [`scrape`] | HTML-page fallback source |
//! | [`scoring`] | Deterministic heuristic score |
//! | [`advisory`] | Language-model opinion and grade extraction |
//! | [`cache`] | Analysis cache trait, SQLite and in-memory backends |
//! | [`analyze`] | The pipeline tying it all together |
//! | [`stats`] | Popularity report |
//! | [`server`] | JSON HTTP API |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod advisory;
pub mod analyze;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod identifier;
pub mod migrate;
pub mod models;
pub mod scoring;
pub mod scrape;
pub mod server;
pub mod stats;
