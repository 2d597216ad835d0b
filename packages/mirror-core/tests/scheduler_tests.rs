//! Integration tests for scheduling: notification batching, debounce,
//! single-flight control, staleness recovery, and the last-error slot.

mod common;

use crate::common::{after_debounce, harness, harness_with_tool};
use chrono::{Duration, Utc};
use mirror_core::catalog::{Catalog, ListFilter};
use mirror_core::state::{self, StateKey, StateStore};
use mirror_core::testing::MockCrawlTool;
use mirror_core::types::{InProgressMarker, MirrorJob};
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test]
async fn test_notify_preserves_order_and_dedupes_by_key() {
    let h = harness();

    h.service
        .notify("Post X published", url("https://example.com/x/"), Some("42"))
        .await
        .unwrap();
    h.service
        .notify("Post Y published", url("https://example.com/y/"), Some("43"))
        .await
        .unwrap();
    // Same key again: the URL mapping is overwritten, not duplicated.
    h.service
        .notify("Post X updated", url("https://example.com/x-new/"), Some("42"))
        .await
        .unwrap();

    let job: MirrorJob = state::load_json(&*h.store, StateKey::PendingJob)
        .await
        .unwrap()
        .expect("pending job exists");

    let texts: Vec<_> = job.changelog.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Post X published", "Post Y published", "Post X updated"]);

    assert_eq!(job.urls.len(), 2);
    let urls: Vec<_> = job.urls.values().map(|u| u.as_str()).collect();
    assert_eq!(urls, vec!["https://example.com/x-new/", "https://example.com/y/"]);
    assert!(!job.recursive);
}

#[tokio::test]
async fn test_change_events_for_one_post_collapse() {
    let h = harness();
    let mut event = mirror_core::ChangeEvent {
        post_id: 42,
        title: "Hello World".to_string(),
        type_label: "post".to_string(),
        action: mirror_core::ChangeAction::Published,
        permalink: url("https://example.com/hello-world/"),
    };

    h.service.notify_change(&event).await.unwrap();
    event.action = mirror_core::ChangeAction::Updated;
    h.service.notify_change(&event).await.unwrap();

    let job: MirrorJob = state::load_json(&*h.store, StateKey::PendingJob)
        .await
        .unwrap()
        .expect("pending job exists");

    assert_eq!(job.urls.len(), 1);
    let texts: Vec<_> = job.changelog.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "The post Hello World was published.",
            "The post Hello World was updated.",
        ]
    );
}

#[tokio::test]
async fn test_burst_coalesces_into_one_dispatch() {
    let h = harness();

    h.service
        .notify("Post X published", url("https://example.com/x/"), None)
        .await
        .unwrap();
    h.service
        .notify("Post Y published", url("https://example.com/y/"), None)
        .await
        .unwrap();

    // One deferred dispatch for the whole burst.
    assert_eq!(h.service.queue().len(), 1);

    h.service.drain(after_debounce()).await.unwrap();

    assert_eq!(h.store.mirror_count(), 1);
    assert!(h.service.queue().is_empty());
    assert!(!h.service.status().await.unwrap().queued);

    // Both URLs crawled sequentially into the same workspace, non-recursively.
    let invocations = h.tool.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].workspace, invocations[1].workspace);
    assert!(invocations.iter().all(|i| !i.recursive));
}

#[tokio::test]
async fn test_drain_before_debounce_runs_nothing() {
    let h = harness();

    h.service
        .notify("Post X published", url("https://example.com/x/"), None)
        .await
        .unwrap();

    h.service.drain(Utc::now()).await.unwrap();

    assert_eq!(h.store.mirror_count(), 0);
    assert_eq!(h.service.queue().len(), 1);
    assert!(h.service.status().await.unwrap().queued);
}

#[tokio::test]
async fn test_fresh_marker_defers_pending_job() {
    let h = harness();

    // Another crawl is running.
    let marker = InProgressMarker::new(Utc::now(), vec![]);
    h.store
        .set(StateKey::InProgress, serde_json::to_value(&marker).unwrap())
        .await
        .unwrap();

    h.service
        .notify("Post X published", url("https://example.com/x/"), None)
        .await
        .unwrap();
    h.service.drain(after_debounce()).await.unwrap();

    // No concurrent crawl; the job folded back into the pending state
    // with a fresh dispatch queued behind the running one.
    assert_eq!(h.store.mirror_count(), 0);
    assert!(h.service.status().await.unwrap().queued);
    assert_eq!(h.service.queue().len(), 1);
}

#[tokio::test]
async fn test_stale_marker_is_cleared_and_dispatch_proceeds() {
    let h = harness();

    let marker = InProgressMarker::new(Utc::now() - Duration::minutes(61), vec![]);
    h.store
        .set(StateKey::InProgress, serde_json::to_value(&marker).unwrap())
        .await
        .unwrap();

    h.service.dispatch_now("Manual mirror").await.unwrap();

    assert_eq!(h.store.mirror_count(), 1);
    let status = h.service.status().await.unwrap();
    assert!(status.in_progress.is_none());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_queued_full_mirrors_coalesce_with_accumulated_changelog() {
    let h = harness();

    h.service.queue_full_mirror("Theme changed");
    h.service.queue_full_mirror("Menu changed");
    assert_eq!(h.service.queue().len(), 1);

    h.service.drain(after_debounce()).await.unwrap();

    assert_eq!(h.store.mirror_count(), 1);
    let invocations = h.tool.invocations();
    assert!(invocations.iter().all(|i| i.recursive));

    // One run carrying both reasons, in order.
    let listed = h.store.list(&ListFilter::default()).await.unwrap();
    let texts: Vec<_> = listed[0].changelog.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["Theme changed", "Menu changed"]);
}

#[tokio::test]
async fn test_dispatch_now_is_full_site_and_recursive() {
    let h = harness();

    let artifact = h.service.dispatch_now("Scheduled Mirror").await.unwrap();

    let invocations = h.tool.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].recursive);
    assert_eq!(invocations[0].url.as_str(), "https://example.com/");
    assert_eq!(artifact.changelog[0].text, "Scheduled Mirror");
}

#[tokio::test]
async fn test_failure_is_recorded_to_last_error_slot() {
    let h = harness_with_tool(MockCrawlTool::producing_nothing());

    h.service
        .notify("Post X published", url("https://example.com/x/"), None)
        .await
        .unwrap();
    // The timer tick itself must not fail on a crawl error.
    h.service.drain(after_debounce()).await.unwrap();

    assert_eq!(h.store.mirror_count(), 0);
    let status = h.service.status().await.unwrap();
    let last_error = status.last_error.expect("failure recorded");
    assert!(last_error.contains("crawl tool produced no output"));
    // The marker was released despite the failure.
    assert!(status.in_progress.is_none());
}

#[tokio::test]
async fn test_success_clears_previous_last_error() {
    let h = harness();

    h.store
        .set(StateKey::LastError, serde_json::json!("previous failure"))
        .await
        .unwrap();

    h.service.dispatch_now("Manual mirror").await.unwrap();

    assert!(h.service.status().await.unwrap().last_error.is_none());
}
