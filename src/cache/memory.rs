//! In-memory [`AnalysisCache`] for tests and ephemeral runs.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; vector order is
//! insertion order, which doubles as the popularity tie-break.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};

use crate::error::{Error, Result};
use crate::identifier::RepositoryIdentifier;
use crate::models::{CacheEntry, CombinedResult};

use super::AnalysisCache;

pub struct InMemoryCache {
    entries: RwLock<Vec<CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<CacheEntry>> {
        self.entries.read().unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<CacheEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisCache for InMemoryCache {
    async fn lookup(&self, id: &RepositoryIdentifier) -> Result<Option<CacheEntry>> {
        let hash = id.repo_hash();
        Ok(self.read().iter().find(|e| e.repo_hash == hash).cloned())
    }

    async fn store(
        &self,
        id: &RepositoryIdentifier,
        result: &CombinedResult,
        created_by: &str,
    ) -> Result<CacheEntry> {
        let hash = id.repo_hash();
        let mut entries = self.write();
        if entries.iter().any(|e| e.repo_hash == hash) {
            return Err(Error::DuplicateEntry(id.slug()));
        }
        let entry = CacheEntry {
            identifier: id.clone(),
            repo_url: id.canonical_url(),
            repo_hash: hash,
            result: result.clone(),
            created_by: created_by.to_string(),
            created_at: Utc::now().trunc_subsecs(0),
            access_count: 1,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn bump(&self, entry: &CacheEntry) -> Result<CacheEntry> {
        let mut entries = self.write();
        let stored = entries
            .iter_mut()
            .find(|e| e.repo_hash == entry.repo_hash)
            .ok_or_else(|| {
                Error::AnalysisFailed(format!("no cache entry for {}", entry.identifier))
            })?;
        stored.access_count += 1;
        Ok(stored.clone())
    }

    async fn most_accessed(&self, limit: i64) -> Result<Vec<CacheEntry>> {
        let mut entries = self.read().clone();
        // sort_by is stable: equal counts keep insertion order
        entries.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.read().len() as i64)
    }
}
