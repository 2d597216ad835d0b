use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use mirror_core::{MirrorConfig, SqliteStore, Sweeper};

#[derive(Args)]
pub struct DeleteExpiredArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,

    /// Cap how many mirrors this run may delete
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn run(args: DeleteExpiredArgs, config: &MirrorConfig) -> Result<()> {
    // Prompt only when someone is actually at the terminal.
    if !args.yes && console::user_attended() {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete mirrors older than {} months?",
                config.retention_months
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!(
        "Sweeping mirrors older than {} months...",
        config.retention_months
    );
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    let sweeper = Sweeper::new(store, None);
    let report = sweeper.sweep(config.retention_months, args.limit).await?;

    println!(
        "{} Deleted {} expired mirror(s)",
        "✓".bright_green(),
        report.deleted
    );

    if !report.errors.is_empty() {
        eprintln!(
            "{} {} mirror(s) could not be deleted:",
            "✗".bright_red(),
            report.errors.len()
        );
        for failure in &report.errors {
            eprintln!(
                "  {} {} ({})",
                failure.id,
                failure.path.display(),
                failure.kind
            );
        }
        bail!("{} deletion(s) failed", report.errors.len());
    }
    Ok(())
}
