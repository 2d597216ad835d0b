//! Static Site Mirroring Library
//!
//! Produces complete, self-contained offline snapshots of a live
//! website: change events are debounced into a single crawl job, an
//! external crawl tool captures the pages into an isolated temp
//! workspace, the workspace is promoted into timestamp-addressed
//! permanent storage with a generated index document, and each snapshot
//! is recorded in a catalog until an expiration sweep reclaims it.
//!
//! # Modules
//!
//! - [`scheduler`] - Debouncing, single-flight control, the pipeline
//! - [`crawl`] - External crawl tool invocation
//! - [`promote`] - Workspace promotion and index generation
//! - [`catalog`] - Mirror metadata persistence and queries
//! - [`sweeper`] - Retention-based expiration
//! - [`state`] - Injectable singleton state (pending job, marker)
//! - [`stores`] - Storage implementations (memory, sqlite)
//! - [`cron`] - Daemon-mode scheduled tasks
//! - [`testing`] - Mock implementations for testing

pub mod catalog;
pub mod cmd;
pub mod config;
pub mod crawl;
pub mod cron;
pub mod error;
pub mod object_store;
pub mod promote;
pub mod scheduler;
pub mod state;
pub mod stores;
pub mod sweeper;
pub mod testing;
pub mod types;

// Re-export core types at crate root
pub use catalog::{Catalog, ListFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use config::MirrorConfig;
pub use crawl::{CrawlExecutor, CrawlInvocation, CrawlTool, TempWorkspace, WgetTool};
pub use error::{MirrorError, PromoteError, Result};
pub use object_store::ObjectStore;
pub use promote::Promoter;
pub use scheduler::{DeferredTask, MirrorService, SchedulerStatus};
pub use state::{StateKey, StateStore};
pub use stores::{MemoryStore, SqliteStore};
pub use sweeper::{DeleteFailure, DeleteFailureKind, SweepReport, Sweeper};
pub use types::{
    changelog_summary, ChangeAction, ChangeEvent, ChangelogEntry, InProgressMarker, MirrorArtifact,
    MirrorId, MirrorJob, MirrorStatus,
};
