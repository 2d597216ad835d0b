//! Object storage boundary.
//!
//! Upload mechanics live outside this system; this trait is the whole
//! contract it relies on. The promoter needs content-typed writes
//! because the crawl tool leaves extensionless and rewritten paths the
//! backend cannot infer types for, and the sweeper needs batch deletion
//! by prefix.

use std::path::Path;

use async_trait::async_trait;

/// A prefix-addressed object store backing the mirror destination.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// True only when the backend, its bucket, and its client are all
    /// present and configured.
    fn is_supported(&self) -> bool;

    /// Upload a local file to `relative`, setting `content_type` when
    /// given. Returns false on failure.
    async fn put(&self, local: &Path, relative: &str, content_type: Option<&str>) -> bool;

    /// Batch delete every object under `relative`. Returns false on
    /// failure; deleting an already-empty prefix is a success.
    async fn delete_prefix(&self, relative: &str) -> bool;
}
