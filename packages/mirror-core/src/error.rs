//! Typed errors for the mirroring library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can fail a mirror job.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The external crawl tool is missing or process execution is unavailable.
    /// Raised before any filesystem state is created.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The crawl tool ran but produced no usable output.
    #[error("crawl tool produced no output (command: {command}): {output}")]
    CrawlToolFailed { command: String, output: String },

    /// Moving the workspace into permanent storage failed.
    #[error("promotion failed: {0}")]
    Promote(#[from] PromoteError),

    /// The catalog rejected a write. Storage now holds an artifact with
    /// no metadata row; reconcilable by listing the mirrors directory
    /// against the catalog.
    #[error("catalog write failed: {0}")]
    CatalogWrite(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Singleton state read/write failed.
    #[error("state store error: {0}")]
    State(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A mirror is already running and its marker is not stale.
    #[error("a mirror is already in progress")]
    InProgress,

    /// Catalog query failed.
    #[error("catalog query failed: {0}")]
    Catalog(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that can occur while promoting a workspace into storage.
#[derive(Debug, Error)]
pub enum PromoteError {
    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object store rejected a write.
    #[error("object store rejected {path}")]
    ObjectStore { path: PathBuf },
}

impl PromoteError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for promotion operations.
pub type PromoteResult<T> = std::result::Result<T, PromoteError>;
