use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unique identifier for a mirror artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorId(pub Uuid);

impl MirrorId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MirrorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MirrorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One human-readable reason a mirror is needed. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub date: DateTime<Utc>,
    pub text: String,
}

impl ChangelogEntry {
    pub fn new(date: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            date,
            text: text.into(),
        }
    }
}

/// Join changelog texts for one-line display.
pub fn changelog_summary(changelog: &[ChangelogEntry]) -> String {
    changelog
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One pending or in-flight crawl request.
///
/// URLs are deduplicated by key with insertion order preserved; the
/// changelog preserves arrival order. At most one pending job exists
/// process-wide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorJob {
    pub urls: IndexMap<String, Url>,
    pub changelog: Vec<ChangelogEntry>,
    pub recursive: bool,
}

impl MirrorJob {
    pub fn new(recursive: bool) -> Self {
        Self {
            urls: IndexMap::new(),
            changelog: Vec::new(),
            recursive,
        }
    }

    /// Append a changelog entry and a URL. Without an explicit key the
    /// fully-qualified URL is the dedupe key; an existing key keeps its
    /// position but takes the newer URL mapping.
    pub fn push(&mut self, entry: ChangelogEntry, url: Url, dedupe_key: Option<&str>) {
        self.changelog.push(entry);
        let key = dedupe_key
            .map(str::to_owned)
            .unwrap_or_else(|| url.to_string());
        self.urls.insert(key, url);
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.changelog.is_empty()
    }
}

/// What happened to a piece of content, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Published,
    Updated,
    Tagged,
}

/// A content-change notification delivered by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub post_id: u64,
    pub title: String,
    /// Human-readable content type, e.g. "post" or "page".
    pub type_label: String,
    pub action: ChangeAction,
    pub permalink: Url,
}

impl ChangeEvent {
    /// The changelog line for this event.
    pub fn changelog_text(&self) -> String {
        let verb = match self.action {
            ChangeAction::Published => "published",
            ChangeAction::Updated => "updated",
            ChangeAction::Tagged => "tagged",
        };
        format!("The {} {} was {}.", self.type_label, self.title, verb)
    }

    /// Stable dedupe key: repeated events for one post collapse into a
    /// single URL entry, latest text winning.
    pub fn dedupe_key(&self) -> String {
        self.post_id.to_string()
    }
}

/// Process-wide record that a crawl is currently executing.
///
/// Two states only: absent, or present with a start time. Cleared on
/// completion, or forcibly by the next scheduling check once stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InProgressMarker {
    pub started_at: DateTime<Utc>,
    pub changelog: Vec<ChangelogEntry>,
}

impl InProgressMarker {
    pub fn new(started_at: DateTime<Utc>, changelog: Vec<ChangelogEntry>) -> Self {
        Self {
            started_at,
            changelog,
        }
    }

    /// A stale marker belongs to a crawl that never completed (process
    /// killed mid-run). Clearing it only unblocks the scheduler; it does
    /// not terminate a still-running crawl process.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.started_at < now - timeout
    }
}

/// Visibility of a catalogued mirror. Listings scope to `Private` by
/// default so in-flight or unpublished entries never leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    Private,
    Public,
}

impl MirrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// One completed, catalogued mirror. Created exactly once after a
/// successful promotion; never mutated except by deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorArtifact {
    pub id: MirrorId,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: MirrorStatus,
    /// Absolute path of the crawled site tree.
    pub storage_dir: PathBuf,
    /// Path relative to the shared storage base; used to build public
    /// URLs and survives moves of the base path.
    pub storage_dir_relative: String,
    pub changelog: Vec<ChangelogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_job_preserves_order_and_dedupes_by_key() {
        let now = Utc::now();
        let mut job = MirrorJob::new(false);
        job.push(ChangelogEntry::new(now, "a"), url("https://example.com/a/"), Some("1"));
        job.push(ChangelogEntry::new(now, "b"), url("https://example.com/b/"), None);
        job.push(ChangelogEntry::new(now, "a again"), url("https://example.com/a2/"), Some("1"));

        // Changelog keeps every entry in arrival order.
        let texts: Vec<_> = job.changelog.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "a again"]);

        // URL set dedupes by key; the latest mapping wins, position is stable.
        assert_eq!(job.urls.len(), 2);
        let urls: Vec<_> = job.urls.values().map(|u| u.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a2/", "https://example.com/b/"]);
    }

    #[test]
    fn test_marker_staleness() {
        let now = Utc::now();
        let fresh = InProgressMarker::new(now - Duration::minutes(59), vec![]);
        let stale = InProgressMarker::new(now - Duration::minutes(61), vec![]);
        assert!(!fresh.is_stale(now, Duration::minutes(60)));
        assert!(stale.is_stale(now, Duration::minutes(60)));
    }
}
