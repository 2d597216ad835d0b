//! Job scheduling and single-flight control.
//!
//! Change events accumulate into one pending [`MirrorJob`] and are
//! debounced into a single deferred dispatch, so a burst of edits
//! produces one crawl. Dispatches go through an explicit FIFO queue
//! with a single consumer ([`MirrorService::drain`]); the triggering
//! caller only appends state and returns, it is never blocked or
//! failed by a downstream crawl error.
//!
//! At most one crawl executes at a time process-wide, enforced by a
//! compare-and-swap on the persisted in-progress marker. A marker older
//! than the staleness timeout belongs to a crawl that never completed
//! and is cleared by the next scheduling check.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use url::Url;

use crate::catalog::Catalog;
use crate::config::MirrorConfig;
use crate::crawl::{CrawlExecutor, CrawlTool};
use crate::error::{MirrorError, Result};
use crate::object_store::ObjectStore;
use crate::promote::{destination_relative, Promoter};
use crate::state::{self, StateKey, StateStore};
use crate::types::{ChangelogEntry, InProgressMarker, MirrorArtifact, MirrorJob};

/// A dispatch waiting for its moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Run whatever the pending job has accumulated.
    DispatchPending,
    /// Full-site recursive crawl of the configured base URLs, with the
    /// changelog accumulated across the calls that queued it.
    DispatchFull { changelog: Vec<ChangelogEntry> },
}

#[derive(Debug)]
struct QueuedTask {
    task: DeferredTask,
    due_at: DateTime<Utc>,
}

/// Explicit FIFO queue of deferred dispatches. One consumer drains it
/// at a well-defined lifecycle point (the timer tick); ordering is FIFO
/// among due tasks; cancellation is never.
#[derive(Default)]
pub struct DeferredQueue {
    inner: std::sync::Mutex<VecDeque<QueuedTask>>,
}

impl DeferredQueue {
    fn push(&self, task: DeferredTask, due_at: DateTime<Utc>) {
        self.inner
            .lock()
            .unwrap()
            .push_back(QueuedTask { task, due_at });
    }

    /// Remove and return the first task that is due. A not-yet-due task
    /// does not block a due one queued behind it.
    fn pop_due(&self, now: DateTime<Utc>) -> Option<DeferredTask> {
        let mut queue = self.inner.lock().unwrap();
        let position = queue.iter().position(|t| t.due_at <= now)?;
        queue.remove(position).map(|t| t.task)
    }

    fn has_pending_dispatch(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.task == DeferredTask::DispatchPending)
    }

    /// Queue a full-site dispatch, or fold the entry into an already
    /// queued one and push its due time back.
    fn push_or_merge_full(&self, entry: ChangelogEntry, due_at: DateTime<Utc>) {
        let mut queue = self.inner.lock().unwrap();
        for queued in queue.iter_mut() {
            if let DeferredTask::DispatchFull { changelog } = &mut queued.task {
                changelog.push(entry);
                queued.due_at = due_at;
                return;
            }
        }
        queue.push_back(QueuedTask {
            task: DeferredTask::DispatchFull {
                changelog: vec![entry],
            },
            due_at,
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// Scheduler state for status displays, derived purely from the
/// persisted singletons.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// A mirror is queued (notifications are accumulating).
    pub queued: bool,
    /// A mirror is running right now.
    pub in_progress: Option<InProgressMarker>,
    /// Failure message from the most recent run, if it failed.
    pub last_error: Option<String>,
}

/// Orchestrates the whole mirror lifecycle: accumulate → crawl →
/// promote → catalogue, under the single-flight guarantee.
pub struct MirrorService {
    config: MirrorConfig,
    state: Arc<dyn StateStore>,
    catalog: Arc<dyn Catalog>,
    executor: CrawlExecutor,
    promoter: Promoter,
    queue: DeferredQueue,
    /// Serializes read-modify-write cycles on the pending job.
    pending_lock: Mutex<()>,
}

impl MirrorService {
    pub fn new(
        config: MirrorConfig,
        state: Arc<dyn StateStore>,
        catalog: Arc<dyn Catalog>,
        tool: Arc<dyn CrawlTool>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let executor = CrawlExecutor::new(config.clone(), tool);
        let promoter = Promoter::new(object_store);
        Self {
            config,
            state,
            catalog,
            executor,
            promoter,
            queue: DeferredQueue::default(),
            pending_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    /// Record one change event: append a changelog entry and a URL to
    /// the pending job, deduplicating by key (latest text wins for a
    /// repeated key). The first notification since the last dispatch
    /// schedules a deferred dispatch after the debounce delay.
    pub async fn notify(&self, text: &str, url: Url, dedupe_key: Option<&str>) -> Result<()> {
        let _guard = self.pending_lock.lock().await;
        let now = Utc::now();

        let mut job: MirrorJob = state::load_json(self.state.as_ref(), StateKey::PendingJob)
            .await?
            .unwrap_or_else(|| MirrorJob::new(false));
        job.push(ChangelogEntry::new(now, text), url, dedupe_key);
        state::store_json(self.state.as_ref(), StateKey::PendingJob, &job).await?;

        if !self.queue.has_pending_dispatch() {
            let due_at = now + self.config.debounce;
            tracing::debug!(due_at = %due_at, "Scheduling debounced mirror dispatch");
            self.queue.push(DeferredTask::DispatchPending, due_at);
        }
        Ok(())
    }

    /// Record a host-delivered content-change event. Repeated events for
    /// the same post collapse into one URL entry.
    pub async fn notify_change(&self, event: &crate::types::ChangeEvent) -> Result<()> {
        self.notify(
            &event.changelog_text(),
            event.permalink.clone(),
            Some(&event.dedupe_key()),
        )
        .await
    }

    /// Queue a debounced full-site mirror. Successive calls within the
    /// window accumulate their changelog entries into the one run and
    /// push its due time back.
    pub fn queue_full_mirror(&self, changelog_text: &str) {
        let now = Utc::now();
        self.queue.push_or_merge_full(
            ChangelogEntry::new(now, changelog_text),
            now + self.config.debounce,
        );
    }

    /// Bypass the debounce: run a full-site recursive crawl of the
    /// configured base URLs right now. Used by the manual trigger and
    /// the daily timer; both rely on their caller's single-instance
    /// guarantee, so a concurrent run surfaces as `InProgress`.
    pub async fn dispatch_now(&self, changelog_text: &str) -> Result<MirrorArtifact> {
        let now = Utc::now();
        let changelog = vec![ChangelogEntry::new(now, changelog_text)];
        self.run_full(changelog, now).await
    }

    /// Drain due deferred dispatches, oldest first. Job failures are
    /// recorded to the last-error slot and logged, never propagated:
    /// only state-store trouble can fail the drain itself.
    pub async fn drain(&self, now: DateTime<Utc>) -> Result<()> {
        while let Some(task) = self.queue.pop_due(now) {
            match task {
                DeferredTask::DispatchPending => self.run_pending(now).await?,
                DeferredTask::DispatchFull { changelog } => {
                    if let Err(MirrorError::InProgress) =
                        self.run_full(changelog.clone(), now).await
                    {
                        tracing::info!("Mirror already in progress, deferring full dispatch");
                        self.queue.push(
                            DeferredTask::DispatchFull { changelog },
                            now + self.config.debounce,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Current scheduler state for status displays.
    pub async fn status(&self) -> Result<SchedulerStatus> {
        let pending: Option<MirrorJob> =
            state::load_json(self.state.as_ref(), StateKey::PendingJob).await?;
        let in_progress: Option<InProgressMarker> =
            state::load_json(self.state.as_ref(), StateKey::InProgress).await?;
        let last_error: Option<String> =
            state::load_json(self.state.as_ref(), StateKey::LastError).await?;
        Ok(SchedulerStatus {
            queued: pending.map_or(false, |job| !job.is_empty()),
            in_progress,
            last_error,
        })
    }

    /// Take and run the pending job. If another crawl holds the marker,
    /// the job folds back into the pending state and a fresh dispatch is
    /// queued: notifications accumulate into the next crawl rather than
    /// spawning a parallel one.
    async fn run_pending(&self, now: DateTime<Utc>) -> Result<()> {
        let job = self.take_pending().await?;
        let Some(job) = job else {
            return Ok(());
        };

        match self.run_job(job.clone(), now).await {
            Err(MirrorError::InProgress) => {
                tracing::info!("Mirror already in progress, deferring pending job");
                self.restore_pending(job).await?;
                self.queue
                    .push(DeferredTask::DispatchPending, now + self.config.debounce);
                Ok(())
            }
            // Recorded in run_job; the timer tick must carry on.
            _ => Ok(()),
        }
    }

    async fn take_pending(&self) -> Result<Option<MirrorJob>> {
        let _guard = self.pending_lock.lock().await;
        let job: Option<MirrorJob> =
            state::load_json(self.state.as_ref(), StateKey::PendingJob).await?;
        if job.is_some() {
            self.state.delete(StateKey::PendingJob).await?;
        }
        Ok(job.filter(|j| !j.is_empty()))
    }

    /// Fold a deferred job back into the pending state, in front of
    /// anything that accumulated while it was out.
    async fn restore_pending(&self, mut job: MirrorJob) -> Result<()> {
        let _guard = self.pending_lock.lock().await;
        if let Some(newer) = state::load_json::<MirrorJob>(self.state.as_ref(), StateKey::PendingJob)
            .await?
        {
            job.changelog.extend(newer.changelog);
            for (key, url) in newer.urls {
                job.urls.insert(key, url);
            }
        }
        state::store_json(self.state.as_ref(), StateKey::PendingJob, &job).await
    }

    async fn run_full(
        &self,
        changelog: Vec<ChangelogEntry>,
        now: DateTime<Utc>,
    ) -> Result<MirrorArtifact> {
        let mut job = MirrorJob::new(true);
        job.changelog = changelog;
        for url in &self.config.base_urls {
            job.urls.insert(url.to_string(), url.clone());
        }
        self.run_job(job, now).await
    }

    /// Execute one job under the single-flight guarantee and record the
    /// outcome in the last-error slot.
    async fn run_job(&self, job: MirrorJob, now: DateTime<Utc>) -> Result<MirrorArtifact> {
        self.acquire_marker(&job.changelog, now).await?;

        let result = self.mirror(&job, now).await;

        // present -> absent is the marker's only other transition; it
        // happens on completion no matter how the job ended.
        self.state.delete(StateKey::InProgress).await?;

        match result {
            Ok(artifact) => {
                self.state.delete(StateKey::LastError).await?;
                Ok(artifact)
            }
            Err(error) => {
                tracing::warn!(%error, "Mirror job failed");
                state::store_json(self.state.as_ref(), StateKey::LastError, &error.to_string())
                    .await?;
                Err(error)
            }
        }
    }

    /// absent -> present transition of the in-progress marker. A fresh
    /// marker rejects the dispatch; a stale one (crawl that never
    /// completed) is replaced. Clearing a stale marker only unblocks
    /// scheduling, it does not terminate a still-running crawl.
    async fn acquire_marker(&self, changelog: &[ChangelogEntry], now: DateTime<Utc>) -> Result<()> {
        let marker = InProgressMarker::new(now, changelog.to_vec());
        let new = serde_json::to_value(&marker).map_err(|e| MirrorError::State(e.into()))?;

        match self.state.get(StateKey::InProgress).await? {
            Some(current) => {
                let existing: InProgressMarker = serde_json::from_value(current.clone())
                    .map_err(|e| MirrorError::State(e.into()))?;
                if !existing.is_stale(now, self.config.stale_after) {
                    return Err(MirrorError::InProgress);
                }
                tracing::warn!(
                    started_at = %existing.started_at,
                    "Clearing stale in-progress marker from a crawl that never completed"
                );
                if !self
                    .state
                    .compare_and_swap(StateKey::InProgress, Some(&current), Some(new))
                    .await?
                {
                    return Err(MirrorError::InProgress);
                }
            }
            None => {
                if !self
                    .state
                    .compare_and_swap(StateKey::InProgress, None, Some(new))
                    .await?
                {
                    return Err(MirrorError::InProgress);
                }
            }
        }
        Ok(())
    }

    /// The crawl-and-promote pipeline: crawl every URL into one temp
    /// workspace, promote it into timestamped storage, then catalogue
    /// the artifact. Promotion before cataloguing: a crash between the
    /// two leaves inspectable files with no row, never a row without
    /// files.
    async fn mirror(&self, job: &MirrorJob, started_at: DateTime<Utc>) -> Result<MirrorArtifact> {
        let workspace = self.executor.execute(&job.urls, job.recursive).await?;

        let relative = destination_relative(started_at);
        let destination = self
            .config
            .storage_root
            .join(relative.trim_start_matches('/'));

        let artifact = self
            .promoter
            .promote(
                workspace.path(),
                &destination,
                &relative,
                job.urls.values(),
                &job.changelog,
                started_at,
            )
            .await?;

        self.catalog.record(&artifact).await?;

        tracing::info!(
            id = %artifact.id,
            destination = %artifact.storage_dir.display(),
            urls = job.urls.len(),
            "Mirror recorded"
        );
        Ok(artifact)
    }
}
