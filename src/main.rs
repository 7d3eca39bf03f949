mod bridge;
mod cli;
mod config;
mod error;
mod listener;
mod model;
mod providers;
mod sync;
mod util;
mod worker;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = cli::parse_args(&args)?;

    match args.command {
        Command::Sync => cli::handle_sync(&args).await,
        Command::Serve => cli::handle_serve(&args).await,
        Command::Inspect => cli::handle_inspect(&args).await,
        Command::Help => {
            cli::print_help();
            Ok(())
        }
    }
}
