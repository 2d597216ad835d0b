use anyhow::Result;
use clap::{Parser, Subcommand};
use mirror_core::MirrorConfig;

mod cmd;
mod render;

#[derive(Parser)]
#[command(name = "mirror", version, about = "Create and manage static mirrors of a site")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalogued mirrors
    List(cmd::list::ListArgs),
    /// Create a new full-site mirror synchronously
    CreateMirror(cmd::create::CreateArgs),
    /// Delete mirrors past the retention threshold
    DeleteExpired(cmd::delete_expired::DeleteExpiredArgs),
    /// Run the scheduler daemon (deferred dispatches and daily timers)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = MirrorConfig::from_env()?;

    match cli.command {
        Command::List(args) => cmd::list::run(args, &config).await,
        Command::CreateMirror(args) => cmd::create::run(args, &config).await,
        Command::DeleteExpired(args) => cmd::delete_expired::run(args, &config).await,
        Command::Run => cmd::run::run(&config).await,
    }
}
