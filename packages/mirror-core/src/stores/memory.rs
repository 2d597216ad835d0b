//! In-memory storage implementation for testing and development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::{Catalog, ListFilter};
use crate::error::Result;
use crate::state::{StateKey, StateStore};
use crate::types::{MirrorArtifact, MirrorId};

/// In-memory catalog and state store.
///
/// Useful for testing and development. Not suitable for production as
/// data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    mirrors: RwLock<HashMap<MirrorId, MirrorArtifact>>,
    state: RwLock<HashMap<&'static str, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of catalogued mirrors.
    pub fn mirror_count(&self) -> usize {
        self.mirrors.read().unwrap().len()
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn record(&self, artifact: &MirrorArtifact) -> Result<()> {
        self.mirrors
            .write()
            .unwrap()
            .insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get(&self, id: MirrorId) -> Result<Option<MirrorArtifact>> {
        Ok(self.mirrors.read().unwrap().get(&id).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<MirrorArtifact>> {
        let mut matching: Vec<_> = self
            .mirrors
            .read()
            .unwrap()
            .values()
            .filter(|m| m.status == filter.status)
            .filter(|m| filter.created_after.map_or(true, |t| m.created_at >= t))
            .filter(|m| filter.created_before.map_or(true, |t| m.created_at <= t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit())
            .collect())
    }

    async fn delete(&self, id: MirrorId) -> Result<()> {
        self.mirrors.write().unwrap().remove(&id);
        Ok(())
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<MirrorArtifact>> {
        let mut expired: Vec<_> = self
            .mirrors
            .read()
            .unwrap()
            .values()
            .filter(|m| m.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(limit) = limit {
            expired.truncate(limit);
        }
        Ok(expired)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: StateKey) -> Result<Option<Value>> {
        Ok(self.state.read().unwrap().get(key.as_str()).cloned())
    }

    async fn set(&self, key: StateKey, value: Value) -> Result<()> {
        self.state.write().unwrap().insert(key.as_str(), value);
        Ok(())
    }

    async fn delete(&self, key: StateKey) -> Result<()> {
        self.state.write().unwrap().remove(key.as_str());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: StateKey,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool> {
        let mut state = self.state.write().unwrap();
        if state.get(key.as_str()) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => {
                state.insert(key.as_str(), value);
            }
            None => {
                state.remove(key.as_str());
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryStore::new();
        let a = serde_json::json!({"n": 1});
        let b = serde_json::json!({"n": 2});

        // absent -> present only succeeds against the absent state
        assert!(store
            .compare_and_swap(StateKey::InProgress, None, Some(a.clone()))
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(StateKey::InProgress, None, Some(b.clone()))
            .await
            .unwrap());

        // present -> absent requires the matching current value
        assert!(!store
            .compare_and_swap(StateKey::InProgress, Some(&b), None)
            .await
            .unwrap());
        assert!(store
            .compare_and_swap(StateKey::InProgress, Some(&a), None)
            .await
            .unwrap());
        assert!(StateStore::get(&store, StateKey::InProgress)
            .await
            .unwrap()
            .is_none());
    }
}
