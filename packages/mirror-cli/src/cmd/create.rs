use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use mirror_core::MirrorConfig;

#[derive(Args)]
pub struct CreateArgs {
    /// Changelog text recorded with the mirror
    #[arg(long, default_value = "A manual mirror triggered from CLI")]
    pub changelog: String,
}

pub async fn run(args: CreateArgs, config: &MirrorConfig) -> Result<()> {
    let (service, _store) = super::build_service(config).await?;

    let artifact = service
        .dispatch_now(&args.changelog)
        .await
        .context("Failed to create mirror")?;

    println!(
        "{} Created mirror {} at {}",
        "✓".bright_green(),
        artifact.id,
        artifact.storage_dir.display()
    );
    Ok(())
}
