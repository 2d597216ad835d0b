//! Singleton state store.
//!
//! The pending job, the in-progress marker and the last-error slot are
//! process-wide singletons. They live behind an injectable store with
//! get / set / compare-and-swap rather than module globals, so the
//! backing can be durable and tests need no process restarts.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{MirrorError, Result};

/// Documented keys for the singleton records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// The pending [`MirrorJob`](crate::types::MirrorJob) accumulating
    /// notifications until dispatch.
    PendingJob,
    /// The [`InProgressMarker`](crate::types::InProgressMarker) for the
    /// currently executing crawl.
    InProgress,
    /// Last job-level failure message, overwritten each run.
    LastError,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingJob => "pending_job",
            Self::InProgress => "in_progress",
            Self::LastError => "last_error",
        }
    }
}

/// Store for process-wide singleton state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: StateKey) -> Result<Option<Value>>;

    async fn set(&self, key: StateKey, value: Value) -> Result<()>;

    async fn delete(&self, key: StateKey) -> Result<()>;

    /// Replace `key` only if its current value equals `expected`
    /// (`None` = absent). Returns false when the current value did not
    /// match and nothing was written.
    async fn compare_and_swap(
        &self,
        key: StateKey,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool>;
}

/// Read a singleton as a typed value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: StateKey,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let typed = serde_json::from_value(value).map_err(|e| MirrorError::State(e.into()))?;
            Ok(Some(typed))
        }
        None => Ok(None),
    }
}

/// Write a singleton from a typed value.
pub async fn store_json<T: Serialize>(
    store: &dyn StateStore,
    key: StateKey,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_value(value).map_err(|e| MirrorError::State(e.into()))?;
    store.set(key, json).await
}
