use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use mirror_core::{cron, MirrorConfig, Sweeper};

/// Daemon mode: keep the cron scheduler alive until interrupted.
pub async fn run(config: &MirrorConfig) -> Result<()> {
    let (service, store) = super::build_service(config).await?;
    let sweeper = Arc::new(Sweeper::new(store, None));

    let mut scheduler = cron::start_scheduler(service, sweeper).await?;

    println!(
        "{}",
        "Mirror scheduler running. Press Ctrl-C to stop.".bright_blue()
    );
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await?;
    println!("Shut down.");
    Ok(())
}
