//! End-to-end tests for the crawl-and-promote pipeline: workspace
//! handling, promotion into timestamped storage, index generation, and
//! catalog round trips.

mod common;

use crate::common::{
    after_debounce, harness, harness_with_bases, harness_with_object_store, harness_with_tool,
    sqlite_harness,
};
use mirror_core::catalog::{Catalog, ListFilter};
use mirror_core::testing::{MockCrawlTool, MockObjectStore};
use mirror_core::MirrorError;
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test]
async fn test_happy_path_notification_to_catalogued_mirror() {
    let h = harness();

    h.service
        .notify("Post X published", url("https://example.com/x/"), None)
        .await
        .unwrap();
    h.service.drain(after_debounce()).await.unwrap();

    let listed = h.store.list(&ListFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let artifact = &listed[0];

    assert_eq!(artifact.changelog.len(), 1);
    assert_eq!(artifact.changelog[0].text, "Post X published");
    assert!(artifact.storage_dir_relative.starts_with("/mirrors/"));

    // The captured page was promoted into the timestamped destination.
    assert!(artifact.storage_dir.join("example.com/x/index.html").is_file());

    // The index document lists the crawled base and the changelog.
    let index = tokio::fs::read_to_string(artifact.storage_dir.join("index.html"))
        .await
        .unwrap();
    assert!(index.contains("example.com/x"));
    assert!(index.contains("Post X published"));

    // The move emptied the temp workspace.
    let invocations = h.tool.invocations();
    assert!(!invocations[0].workspace.exists());
}

#[tokio::test]
async fn test_missing_dependency_fails_before_any_state() {
    let h = harness_with_tool(MockCrawlTool::unavailable());

    let result = h.service.dispatch_now("Manual mirror").await;

    assert!(matches!(result, Err(MirrorError::DependencyUnavailable(_))));
    // The tool was never invoked and no destination was created.
    assert!(h.tool.invocations().is_empty());
    assert!(!h.scratch.path().join("mirrors").exists());
    assert_eq!(h.store.mirror_count(), 0);
}

#[tokio::test]
async fn test_tool_producing_nothing_fails_the_whole_job() {
    let h = harness_with_tool(MockCrawlTool::producing_nothing());

    let result = h.service.dispatch_now("Manual mirror").await;

    match result {
        Err(MirrorError::CrawlToolFailed { command, .. }) => {
            assert!(command.contains("https://example.com/"));
        }
        other => panic!("expected CrawlToolFailed, got {other:?}"),
    }
    // No partial promotion of a half-crawled job.
    assert!(!h.scratch.path().join("mirrors").exists());
    assert_eq!(h.store.mirror_count(), 0);
}

#[tokio::test]
async fn test_recursive_full_site_crawl_with_two_bases() {
    let h = harness_with_bases(
        MockCrawlTool::new(),
        vec![
            url("https://example.com/"),
            url("https://docs.example.org/"),
        ],
    );

    let artifact = h.service.dispatch_now("Scheduled Mirror").await.unwrap();

    // Both bases crawled sequentially into one shared workspace.
    let invocations = h.tool.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].workspace, invocations[1].workspace);
    assert!(invocations.iter().all(|i| i.recursive));

    // One promoted artifact whose index lists both hosts.
    assert_eq!(h.store.mirror_count(), 1);
    let index = tokio::fs::read_to_string(artifact.storage_dir.join("index.html"))
        .await
        .unwrap();
    assert!(index.contains("example.com"));
    assert!(index.contains("docs.example.org"));
}

#[tokio::test]
async fn test_promote_then_record_round_trips_through_sqlite() {
    let h = sqlite_harness().await;

    let artifact = h.service.dispatch_now("Manual mirror").await.unwrap();

    let listed = h.store.list(&ListFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let stored = &listed[0];

    assert_eq!(stored.id, artifact.id);
    assert_eq!(stored.storage_dir_relative, artifact.storage_dir_relative);
    assert_eq!(stored.changelog, artifact.changelog);
    // Creation time survives to the second.
    assert_eq!(stored.created_at.timestamp(), artifact.created_at.timestamp());
}

#[tokio::test]
async fn test_object_store_promotion_sets_html_content_type() {
    let h = harness_with_object_store(MockCrawlTool::new(), MockObjectStore::new());

    h.service.dispatch_now("Manual mirror").await.unwrap();

    let store = h.object_store.as_ref().unwrap();
    let puts = store.puts();
    assert!(!puts.is_empty());

    // Every captured HTML document got an explicit content type.
    let page = puts
        .iter()
        .find(|(key, _)| key.ends_with("example.com/index.html"))
        .expect("captured page uploaded");
    assert_eq!(page.1.as_deref(), Some("text/html"));

    // The generated index document too.
    let index = puts
        .iter()
        .find(|(key, _)| {
            key.starts_with("mirrors/") && key.matches('/').count() == 5 && key.ends_with("/index.html")
        })
        .expect("index uploaded");
    assert_eq!(index.1.as_deref(), Some("text/html"));

    // The catalog row exists either way.
    assert_eq!(h.store.mirror_count(), 1);
}
