//! # repo-trust CLI (`rtrust`)
//!
//! ## Usage
//!
//! ```bash
//! rtrust --config ./config/rtrust.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rtrust init` | Create the SQLite database and schema |
//! | `rtrust analyze <url>` | Score a repository (served from cache when possible) |
//! | `rtrust stats` | Total analyses and the most-accessed repositories |
//! | `rtrust serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! rtrust init --config ./config/rtrust.toml
//! rtrust analyze https://github.com/tokio-rs/tokio --as alice
//! rtrust analyze github.com/tokio-rs/tokio.git --json
//! rtrust stats --limit 10
//! RUST_LOG=repo_trust=debug rtrust serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_trust::{analyze, config, migrate, server, stats};

/// repo-trust: trust and quality ratings for public GitHub repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rtrust.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rtrust",
    about = "Trust and quality ratings for public GitHub repositories",
    version,
    long_about = "repo-trust combines a deterministic heuristic score over repository metadata \
    with an advisory opinion from a language model, and caches every analysis so repeat \
    lookups are cheap."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rtrust.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `analyses` table. Safe to
    /// run repeatedly.
    Init,

    /// Analyze a repository.
    ///
    /// Accepts any common spelling of a GitHub URL (`https://`, scheme-less,
    /// trailing slash, `.git`, SSH remote). Cached analyses are returned
    /// without touching the network.
    Analyze {
        /// Repository URL, e.g. `https://github.com/owner/name`.
        url: String,

        /// Name recorded as the creator of a new analysis.
        #[arg(long = "as", value_name = "USER")]
        user: Option<String>,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the popularity report.
    Stats {
        /// Number of repositories to list (defaults to `report.popular_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repo_trust=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tokens may live in a local .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze { url, user, json } => {
            analyze::run_analyze(&cfg, &url, user.as_deref(), json).await?;
        }
        Commands::Stats { limit, json } => {
            stats::run_stats(&cfg, limit, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
