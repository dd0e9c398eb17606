mod cli;
mod client;
mod commands;
mod completions;
mod error;
mod output;
mod report;
mod session;
mod state;
mod theme;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use client::HttpRelay;
use state::ClientState;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return;
    }

    let _guard = init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let relay = HttpRelay::new(cli.server);
    tracing::debug!(server = relay.base_url(), "Using relay");

    match cli.command {
        Commands::Ask(args) => commands::ask::run(&relay, args, cli.format).await,
        Commands::Chat(args) => commands::chat::run(&relay, args).await,
        Commands::Messages { thread_id } => {
            let biome = ClientState::load().biome;
            commands::messages::run(&relay, &thread_id, cli.format, biome).await
        }
        Commands::Download { file_id, out } => {
            commands::download::run(&relay, &file_id, &out, cli.format).await
        }
        Commands::Theme { biome } => commands::theme::run(biome, cli.format),
        Commands::Completions { shell } => {
            completions::generate_completions(shell);
            Ok(())
        }
    }
}

/// Logs go to a daily file so they never interleave with streamed text.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let log_dir = std::env::var_os("ECOSURE_LOG_DIR")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|dir| dir.join("ecosure").join("logs")))?;
    std::fs::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "ecosure.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();
    Some(guard)
}
