//! Analysis cache abstraction.
//!
//! The [`AnalysisCache`] trait is the read/write contract the pipeline needs
//! from durable storage: one entry per [`RepositoryIdentifier`], an access
//! counter bumped on every hit, and a popularity report.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | [`SqliteCache`] | `analyses` table (durable) |
//! | [`InMemoryCache`] | `RwLock<Vec<_>>` (tests, ephemeral runs) |
//!
//! No check-and-set is offered: callers `lookup` first and must handle
//! [`Error::DuplicateEntry`](crate::error::Error::DuplicateEntry) from `store`
//! when a concurrent writer got there first.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifier::RepositoryIdentifier;
use crate::models::{CacheEntry, CombinedResult};

pub use memory::InMemoryCache;
pub use sqlite::SqliteCache;

#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Fetch the entry for `id`, if any. Does not touch the access counter.
    async fn lookup(&self, id: &RepositoryIdentifier) -> Result<Option<CacheEntry>>;

    /// Insert a new entry with `access_count = 1`.
    ///
    /// Fails with `DuplicateEntry` if `id` already has one.
    async fn store(
        &self,
        id: &RepositoryIdentifier,
        result: &CombinedResult,
        created_by: &str,
    ) -> Result<CacheEntry>;

    /// Increment the access counter of `entry` and return the updated entry.
    /// `created_at` is left untouched.
    async fn bump(&self, entry: &CacheEntry) -> Result<CacheEntry>;

    /// Up to `limit` entries by access count descending, ties in insertion order.
    async fn most_accessed(&self, limit: i64) -> Result<Vec<CacheEntry>>;

    async fn count(&self) -> Result<i64>;
}
