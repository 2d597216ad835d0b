//! Shared test harness: a mirror service wired to in-memory stores, a
//! scripted crawl tool, and a scratch storage root.

#![allow(dead_code)]

use std::sync::Arc;

use mirror_core::config::MirrorConfig;
use mirror_core::stores::{MemoryStore, SqliteStore};
use mirror_core::testing::{MockCrawlTool, MockObjectStore};
use mirror_core::MirrorService;
use tempfile::TempDir;
use url::Url;

pub struct TestHarness {
    pub service: MirrorService,
    pub store: Arc<MemoryStore>,
    pub tool: Arc<MockCrawlTool>,
    pub object_store: Option<Arc<MockObjectStore>>,
    /// Scratch storage root; dropped last, removing all mirror output.
    pub scratch: TempDir,
}

pub fn base_url() -> Url {
    Url::parse("https://example.com/").unwrap()
}

pub fn test_config(scratch: &TempDir, base_urls: Vec<Url>) -> MirrorConfig {
    MirrorConfig::new(base_urls, scratch.path())
}

pub fn harness() -> TestHarness {
    harness_with_tool(MockCrawlTool::new())
}

pub fn harness_with_tool(tool: MockCrawlTool) -> TestHarness {
    harness_for(tool, vec![base_url()], None)
}

pub fn harness_with_object_store(tool: MockCrawlTool, object_store: MockObjectStore) -> TestHarness {
    harness_for(tool, vec![base_url()], Some(Arc::new(object_store)))
}

pub fn harness_with_bases(tool: MockCrawlTool, base_urls: Vec<Url>) -> TestHarness {
    harness_for(tool, base_urls, None)
}

fn harness_for(
    tool: MockCrawlTool,
    base_urls: Vec<Url>,
    object_store: Option<Arc<MockObjectStore>>,
) -> TestHarness {
    let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
    let config = test_config(&scratch, base_urls);
    let store = Arc::new(MemoryStore::new());
    let tool = Arc::new(tool);
    let service = MirrorService::new(
        config,
        store.clone(),
        store.clone(),
        tool.clone(),
        object_store
            .clone()
            .map(|s| s as Arc<dyn mirror_core::ObjectStore>),
    );
    TestHarness {
        service,
        store,
        tool,
        object_store,
        scratch,
    }
}

/// Harness variant backed by an in-memory sqlite store, for round-trip
/// coverage through the real persistence layer.
pub struct SqliteHarness {
    pub service: MirrorService,
    pub store: Arc<SqliteStore>,
    pub tool: Arc<MockCrawlTool>,
    pub scratch: TempDir,
}

pub async fn sqlite_harness() -> SqliteHarness {
    let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
    let config = test_config(&scratch, vec![base_url()]);
    let store = Arc::new(SqliteStore::in_memory().await.expect("sqlite store"));
    let tool = Arc::new(MockCrawlTool::new());
    let service = MirrorService::new(config, store.clone(), store.clone(), tool.clone(), None);
    SqliteHarness {
        service,
        store,
        tool,
        scratch,
    }
}

/// A drain timestamp safely past the debounce window.
pub fn after_debounce() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::seconds(61)
}
