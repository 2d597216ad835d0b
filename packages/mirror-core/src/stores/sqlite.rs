//! SQLite storage implementation.
//!
//! File-based backing for the catalog and singleton state. Good for
//! single-server deployments and testing with persistent data.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::catalog::{Catalog, ListFilter};
use crate::error::{MirrorError, Result};
use crate::state::{StateKey, StateStore};
use crate::types::{ChangelogEntry, MirrorArtifact, MirrorId, MirrorStatus};

/// SQLite-backed catalog and state store.
pub struct SqliteStore {
    pool: SqlitePool,
    /// Serializes compare-and-swap read-modify-write cycles. The
    /// single-flight invariant assumes a single process; multi-worker
    /// deployments need an external lock around dispatch (§ concurrency
    /// model), not a wider one here.
    state_lock: Mutex<()>,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite:mirror.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5).await
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` would otherwise open its own empty database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MirrorError::Catalog(e.into()))?;

        let store = Self {
            pool,
            state_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mirrors (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'private',
                storage_dir TEXT NOT NULL,
                storage_dir_relative TEXT NOT NULL,
                changelog TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_mirrors_created_at ON mirrors(created_at);
            CREATE INDEX IF NOT EXISTS idx_mirrors_status ON mirrors(status);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::Catalog(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS singleton_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::State(e.into()))?;

        Ok(())
    }
}

/// Timestamps are stored as second-precision RFC 3339 in UTC. The fixed
/// width keeps lexicographic and chronological order identical, so the
/// created_at index serves range queries directly.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MirrorError::Catalog(e.into()))
}

#[derive(FromRow)]
struct MirrorRow {
    id: String,
    created_at: String,
    started_at: String,
    ended_at: String,
    status: String,
    storage_dir: String,
    storage_dir_relative: String,
    changelog: String,
}

impl MirrorRow {
    fn into_artifact(self) -> Result<MirrorArtifact> {
        let id = Uuid::parse_str(&self.id).map_err(|e| MirrorError::Catalog(e.into()))?;
        let status = MirrorStatus::parse(&self.status).ok_or_else(|| {
            MirrorError::Catalog(format!("unknown mirror status: {}", self.status).into())
        })?;
        let changelog: Vec<ChangelogEntry> =
            serde_json::from_str(&self.changelog).map_err(|e| MirrorError::Catalog(e.into()))?;
        Ok(MirrorArtifact {
            id: MirrorId(id),
            created_at: parse_ts(&self.created_at)?,
            started_at: parse_ts(&self.started_at)?,
            ended_at: parse_ts(&self.ended_at)?,
            status,
            storage_dir: self.storage_dir.into(),
            storage_dir_relative: self.storage_dir_relative,
            changelog,
        })
    }
}

#[async_trait]
impl Catalog for SqliteStore {
    async fn record(&self, artifact: &MirrorArtifact) -> Result<()> {
        let changelog = serde_json::to_string(&artifact.changelog)
            .map_err(|e| MirrorError::CatalogWrite(e.into()))?;
        sqlx::query(
            r#"
            INSERT INTO mirrors (
                id, created_at, started_at, ended_at, status,
                storage_dir, storage_dir_relative, changelog
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact.id.to_string())
        .bind(format_ts(artifact.created_at))
        .bind(format_ts(artifact.started_at))
        .bind(format_ts(artifact.ended_at))
        .bind(artifact.status.as_str())
        .bind(artifact.storage_dir.to_string_lossy().into_owned())
        .bind(&artifact.storage_dir_relative)
        .bind(changelog)
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::CatalogWrite(e.into()))?;
        Ok(())
    }

    async fn get(&self, id: MirrorId) -> Result<Option<MirrorArtifact>> {
        let row = sqlx::query_as::<_, MirrorRow>("SELECT * FROM mirrors WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MirrorError::Catalog(e.into()))?;
        row.map(MirrorRow::into_artifact).transpose()
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<MirrorArtifact>> {
        let after = filter.created_after.map(format_ts);
        let before = filter.created_before.map(format_ts);
        let rows = sqlx::query_as::<_, MirrorRow>(
            r#"
            SELECT * FROM mirrors
            WHERE status = ?
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(filter.status.as_str())
        .bind(after.clone())
        .bind(after)
        .bind(before.clone())
        .bind(before)
        .bind(filter.limit() as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Catalog(e.into()))?;
        rows.into_iter().map(MirrorRow::into_artifact).collect()
    }

    async fn delete(&self, id: MirrorId) -> Result<()> {
        sqlx::query("DELETE FROM mirrors WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::Catalog(e.into()))?;
        Ok(())
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<MirrorArtifact>> {
        // LIMIT -1 is sqlite for "no limit".
        let rows = sqlx::query_as::<_, MirrorRow>(
            r#"
            SELECT * FROM mirrors
            WHERE created_at < ?
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(format_ts(cutoff))
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MirrorError::Catalog(e.into()))?;
        rows.into_iter().map(MirrorRow::into_artifact).collect()
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: StateKey) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM singleton_state WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MirrorError::State(e.into()))?;
        row.map(|r| {
            let raw: String = r.get("value");
            serde_json::from_str(&raw).map_err(|e| MirrorError::State(e.into()))
        })
        .transpose()
    }

    async fn set(&self, key: StateKey, value: Value) -> Result<()> {
        let raw = serde_json::to_string(&value).map_err(|e| MirrorError::State(e.into()))?;
        sqlx::query(
            r#"
            INSERT INTO singleton_state (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key.as_str())
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(|e| MirrorError::State(e.into()))?;
        Ok(())
    }

    async fn delete(&self, key: StateKey) -> Result<()> {
        sqlx::query("DELETE FROM singleton_state WHERE key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| MirrorError::State(e.into()))?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: StateKey,
        expected: Option<&Value>,
        new: Option<Value>,
    ) -> Result<bool> {
        let _guard = self.state_lock.lock().await;
        let current = StateStore::get(self, key).await?;
        if current.as_ref() != expected {
            return Ok(false);
        }
        match new {
            Some(value) => StateStore::set(self, key, value).await?,
            None => StateStore::delete(self, key).await?,
        }
        Ok(true)
    }
}
