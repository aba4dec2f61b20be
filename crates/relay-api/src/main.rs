//! Relay CLI entry point.
//!
//! Binary name: `relay`
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to the command handler or runs the engine in the foreground.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use relay_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::{AppState, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `serve` is a long-running process whose logs are its output, so it
    // defaults to info; one-shot commands only surface warnings.
    let serving = matches!(cli.command, Commands::Serve);
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 if serving => "info",
        0 => "warn",
        1 => "info,relay_core=debug,relay_infra=debug",
        _ => "trace",
    };
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(filter, format, cli.otel).map_err(|e| anyhow::anyhow!(e))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "relay", &mut std::io::stdout());
        return Ok(());
    }

    let mode = if matches!(cli.command, Commands::Serve) {
        Mode::Supervised
    } else {
        Mode::StoreOnly
    };
    let state = AppState::init(mode).await?;

    match cli.command {
        Commands::Serve => {
            cli::serve::serve(&state, shutdown_signal(), cli.quiet).await?;
        }

        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.user, cli.json).await?;
        }

        Commands::Token { action } => {
            cli::token::handle_token_command(action, &state, cli.user, cli.json).await?;
        }

        Commands::Handlers => {
            cli::handlers::list_handlers(&state, cli.json)?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
