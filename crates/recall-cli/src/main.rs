//! recall entry point.
//!
//! Binary name: `recall`
//!
//! Parses CLI arguments, loads configuration, then dispatches to the command
//! handlers in [`cli::memory`].

mod cli;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,recall=debug",
        _ => "trace",
    };
    recall_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let state = AppState::init(cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Serve => cli::memory::serve(&state).await,
        Commands::Reset => cli::memory::reset(&state, cli.json).await,
        Commands::Ingest { reset, texts } => {
            cli::memory::ingest(&state, &texts, reset, cli.json).await
        }
        Commands::Query { texts } => cli::memory::query(&state, &texts, cli.json).await,
        Commands::Demo => cli::memory::demo(&state, cli.json).await,
        Commands::Check => cli::memory::check(&state, cli.json).await,
    };

    recall_observe::tracing_setup::shutdown_tracing();
    result
}

/// Wait for Ctrl+C or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
