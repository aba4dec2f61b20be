//! CLI command definitions for the `relay` binary.
//!
//! Uses clap derive macros for argument parsing. Commands follow a noun-verb
//! pattern (e.g., `relay workflow create`, `relay token list`).

pub mod handlers;
pub mod serve;
pub mod token;
pub mod workflow;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use relay_types::workflow::UserId;

/// Run action/reaction workflows against your connected services.
#[derive(Parser)]
#[command(name = "relay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// User the command acts for (UUID).
    #[arg(long, global = true, env = "RELAY_USER")]
    pub user: Option<UserId>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every active workflow until Ctrl+C or SIGTERM.
    Serve,

    /// Manage workflows (create, list, show, disable, enable, output).
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Manage per-service tokens (set, list, delete).
    Token {
        #[command(subcommand)]
        action: token::TokenCommand,
    },

    /// List the available action and reaction handlers.
    Handlers,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// The user given with `--user` or `RELAY_USER`.
pub fn require_user(user: Option<UserId>) -> Result<UserId> {
    user.context("no user given: pass --user <UUID> or set RELAY_USER")
}

/// Pluralize a count for summary lines.
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
