//! Mirror catalog.
//!
//! The catalog exclusively owns the metadata rows; the filesystem or
//! object store owns the bytes under each `storage_dir`. A row implies
//! live storage. Only the expiration sweeper may break that invariant,
//! and only by deleting both sides together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{MirrorArtifact, MirrorId, MirrorStatus};

/// Default page size for listings, matching the CLI default.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Hard bound so a listing can never pull the whole catalog at once.
pub const MAX_PAGE_SIZE: usize = 500;

/// Filter for catalog listings.
#[derive(Debug, Clone)]
pub struct ListFilter {
    /// Listings scope to private entries unless told otherwise.
    pub status: MirrorStatus,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            status: MirrorStatus::Private,
            created_after: None,
            created_before: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListFilter {
    pub fn page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn limit(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.limit()
    }
}

/// Persistence for mirror metadata.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create a permanent entry. Called exactly once per successful
    /// promotion; this is the only write path that creates a row.
    async fn record(&self, artifact: &MirrorArtifact) -> Result<()>;

    async fn get(&self, id: MirrorId) -> Result<Option<MirrorArtifact>>;

    /// Matching entries, newest first by creation time.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<MirrorArtifact>>;

    /// Remove the row only. Callers are responsible for having already
    /// removed the underlying storage; the catalog never touches the
    /// filesystem.
    async fn delete(&self, id: MirrorId) -> Result<()>;

    /// Entries created before `cutoff`, oldest first, optionally capped.
    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<MirrorArtifact>>;
}
