//! Expiration sweeper.
//!
//! Walks the catalog for mirrors older than the retention threshold and
//! deletes storage first, then the catalog row. The row survives any
//! storage-deletion failure, preserving "a row implies live storage" at
//! the cost of retrying on every sweep until the deletion succeeds. One
//! bad mirror never aborts the rest of the sweep.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tokio::fs;

use crate::catalog::Catalog;
use crate::error::{MirrorError, Result};
use crate::object_store::ObjectStore;
use crate::types::{MirrorArtifact, MirrorId};

/// Per-item failure during a sweep. Non-fatal; collected and reported
/// at the end.
#[derive(Debug, Clone)]
pub struct DeleteFailure {
    pub id: MirrorId,
    pub path: PathBuf,
    pub kind: DeleteFailureKind,
}

#[derive(Debug, Clone)]
pub enum DeleteFailureKind {
    /// Storage deletion failed; the catalog row was deliberately kept.
    Storage(String),
    /// Storage is gone but the catalog row could not be removed.
    Catalog(String),
}

impl std::fmt::Display for DeleteFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(reason) => write!(f, "storage delete failed: {reason}"),
            Self::Catalog(reason) => write!(f, "catalog delete failed: {reason}"),
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: usize,
    pub errors: Vec<DeleteFailure>,
}

pub struct Sweeper {
    catalog: Arc<dyn Catalog>,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl Sweeper {
    pub fn new(catalog: Arc<dyn Catalog>, object_store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            catalog,
            object_store,
        }
    }

    /// Delete mirrors older than `retention_months`. `batch_limit`
    /// bounds per-run cost for recurring timer runs; explicit one-off
    /// runs pass `None` and sweep everything due.
    pub async fn sweep(
        &self,
        retention_months: u32,
        batch_limit: Option<usize>,
    ) -> Result<SweepReport> {
        let cutoff = Utc::now()
            .checked_sub_months(Months::new(retention_months))
            .ok_or_else(|| {
                MirrorError::Catalog(
                    format!("retention of {retention_months} months underflows the calendar").into(),
                )
            })?;
        self.sweep_before(cutoff, batch_limit).await
    }

    /// Delete mirrors created before `cutoff`, oldest first.
    pub async fn sweep_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_limit: Option<usize>,
    ) -> Result<SweepReport> {
        let candidates = self.catalog.find_expired(cutoff, batch_limit).await?;
        tracing::info!(
            cutoff = %cutoff,
            candidates = candidates.len(),
            "Starting expiration sweep"
        );

        let mut report = SweepReport::default();
        for (index, artifact) in candidates.iter().enumerate() {
            match self.delete_storage(artifact).await {
                Ok(()) => match self.catalog.delete(artifact.id).await {
                    Ok(()) => report.deleted += 1,
                    Err(error) => {
                        tracing::warn!(id = %artifact.id, %error, "Failed to delete catalog row");
                        report.errors.push(DeleteFailure {
                            id: artifact.id,
                            path: artifact.storage_dir.clone(),
                            kind: DeleteFailureKind::Catalog(error.to_string()),
                        });
                    }
                },
                Err(reason) => {
                    tracing::warn!(
                        id = %artifact.id,
                        path = %artifact.storage_dir.display(),
                        %reason,
                        "Failed to delete mirror storage, keeping catalog row"
                    );
                    report.errors.push(DeleteFailure {
                        id: artifact.id,
                        path: artifact.storage_dir.clone(),
                        kind: DeleteFailureKind::Storage(reason),
                    });
                }
            }

            // Keep long sweeps observable without logging every item.
            if (index + 1) % 50 == 0 {
                tracing::debug!(processed = index + 1, "Sweep progress");
            }
        }

        tracing::info!(
            deleted = report.deleted,
            errors = report.errors.len(),
            "Expiration sweep finished"
        );
        Ok(report)
    }

    /// Remove the bytes for one mirror. An already-absent directory is
    /// a success, which is what makes the sweep idempotent.
    async fn delete_storage(&self, artifact: &MirrorArtifact) -> std::result::Result<(), String> {
        if let Some(store) = self.object_store.as_ref().filter(|s| s.is_supported()) {
            if store.delete_prefix(&artifact.storage_dir_relative).await {
                return Ok(());
            }
            return Err("object store prefix delete failed".to_string());
        }

        let dir = &artifact.storage_dir;
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(dir).await.map_err(|e| e.to_string())
    }
}
