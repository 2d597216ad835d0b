//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Three timers drive the service when it runs as a daemon:
//! - a per-minute tick draining the deferred dispatch queue
//! - a daily full-site mirror
//! - a daily bounded expiration sweep
//!
//! Tick errors are logged and swallowed; a failing run must not stop
//! the schedule.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::scheduler::MirrorService;
use crate::sweeper::Sweeper;

/// Start all scheduled tasks
pub async fn start_scheduler(
    service: Arc<MirrorService>,
    sweeper: Arc<Sweeper>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Deferred dispatch drain - runs every minute
    let drain_service = service.clone();
    let drain_job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let service = drain_service.clone();
        Box::pin(async move {
            if let Err(e) = service.drain(Utc::now()).await {
                tracing::error!("Deferred dispatch drain failed: {}", e);
            }
        })
    })?;
    scheduler.add(drain_job).await?;

    // Daily full-site mirror - runs at 23:59
    let mirror_service = service.clone();
    let mirror_job = Job::new_async("0 59 23 * * *", move |_uuid, _lock| {
        let service = mirror_service.clone();
        Box::pin(async move {
            // Failures are recorded to the last-error slot by the run itself.
            if let Err(e) = service.dispatch_now("Scheduled Mirror").await {
                tracing::error!("Scheduled mirror failed: {}", e);
            }
        })
    })?;
    scheduler.add(mirror_job).await?;

    // Daily bounded expiration sweep - runs at 03:29
    let retention_months = service.config().retention_months;
    let batch_limit = service.config().sweep_batch_limit;
    let sweep_job = Job::new_async("0 29 3 * * *", move |_uuid, _lock| {
        let sweeper = sweeper.clone();
        Box::pin(async move {
            match sweeper.sweep(retention_months, Some(batch_limit)).await {
                Ok(report) if !report.errors.is_empty() => {
                    tracing::warn!(
                        deleted = report.deleted,
                        errors = report.errors.len(),
                        "Scheduled sweep finished with errors"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Scheduled sweep failed: {}", e),
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;

    tracing::info!(
        "Scheduled tasks started (dispatch drain every minute, daily mirror 23:59, daily sweep 03:29)"
    );
    Ok(scheduler)
}
