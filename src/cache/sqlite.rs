//! SQLite-backed [`AnalysisCache`].
//!
//! Maps each cache operation onto the `analyses` table created by
//! [`crate::migrate`]. The `UNIQUE` constraints on `repo_url` and
//! `repo_hash` enforce one entry per identifier even when two writers race.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::identifier::RepositoryIdentifier;
use crate::migrate;
use crate::models::{CacheEntry, CombinedResult};

use super::AnalysisCache;

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database, creating the schema if needed.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config)
            .await
            .with_context(|| format!("Failed to open database {}", config.db.path.display()))?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

fn row_to_entry(row: &SqliteRow) -> Result<CacheEntry> {
    let repo_url: String = row.try_get("repo_url")?;
    let identifier = RepositoryIdentifier::parse(&repo_url)
        .map_err(|e| Error::AnalysisFailed(format!("corrupt cache row: {}", e)))?;
    let analysis_json: String = row.try_get("analysis_json")?;
    let result: CombinedResult = serde_json::from_str(&analysis_json)?;
    let created_ts: i64 = row.try_get("created_at")?;
    let created_at = DateTime::<Utc>::from_timestamp(created_ts, 0).ok_or_else(|| {
        Error::AnalysisFailed(format!("corrupt cache row: bad timestamp {}", created_ts))
    })?;

    Ok(CacheEntry {
        identifier,
        repo_url,
        repo_hash: row.try_get("repo_hash")?,
        result,
        created_by: row.try_get("created_by")?,
        created_at,
        access_count: row.try_get("access_count")?,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT repo_url, repo_hash, analysis_json, created_by, created_at, access_count FROM analyses";

#[async_trait]
impl AnalysisCache for SqliteCache {
    async fn lookup(&self, id: &RepositoryIdentifier) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(&format!("{} WHERE repo_hash = ?", SELECT_COLUMNS))
            .bind(id.repo_hash())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn store(
        &self,
        id: &RepositoryIdentifier,
        result: &CombinedResult,
        created_by: &str,
    ) -> Result<CacheEntry> {
        let created_at = Utc::now().trunc_subsecs(0);
        let analysis_json = serde_json::to_string(result)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO analyses (repo_url, repo_hash, owner, name, analysis_json,
                                  created_by, created_at, access_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(id.canonical_url())
        .bind(id.repo_hash())
        .bind(id.owner())
        .bind(id.name())
        .bind(&analysis_json)
        .bind(created_by)
        .bind(created_at.timestamp())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(CacheEntry {
                identifier: id.clone(),
                repo_url: id.canonical_url(),
                repo_hash: id.repo_hash(),
                result: result.clone(),
                created_by: created_by.to_string(),
                created_at,
                access_count: 1,
            }),
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateEntry(id.slug())),
            Err(e) => Err(e.into()),
        }
    }

    async fn bump(&self, entry: &CacheEntry) -> Result<CacheEntry> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE analyses SET access_count = access_count + 1 WHERE repo_hash = ? RETURNING access_count",
        )
        .bind(&entry.repo_hash)
        .fetch_optional(&self.pool)
        .await?;

        let access_count = count.ok_or_else(|| {
            Error::AnalysisFailed(format!("no cache entry for {}", entry.identifier))
        })?;

        Ok(CacheEntry {
            access_count,
            ..entry.clone()
        })
    }

    async fn most_accessed(&self, limit: i64) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY access_count DESC, id ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
