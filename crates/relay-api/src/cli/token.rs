//! Service token CLI commands: set, list, delete.

use anyhow::{Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Password;

use relay_core::repository::credential::CredentialRepository;
use relay_types::credential::ServiceToken;
use relay_types::workflow::UserId;

use super::{plural, require_user};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Store the user's token for a service, replacing any previous one.
    ///
    /// Prompts with hidden input unless --value is given.
    Set {
        /// Service name as used by handlers (e.g. spotify, github, microsoft).
        service: String,

        /// Token value (for scripts; omit to be prompted).
        #[arg(long)]
        value: Option<String>,

        /// Refresh token to keep alongside.
        #[arg(long)]
        refresh_token: Option<String>,
    },

    /// List the user's tokens with masked values.
    #[command(alias = "ls")]
    List,

    /// Delete the user's token for a service.
    #[command(alias = "rm")]
    Delete {
        service: String,
    },
}

pub async fn handle_token_command(
    cmd: TokenCommand,
    state: &AppState,
    user: Option<UserId>,
    json: bool,
) -> Result<()> {
    let user_id = require_user(user)?;
    match cmd {
        TokenCommand::Set {
            service,
            value,
            refresh_token,
        } => set_token(state, user_id, &service, value, refresh_token, json).await,
        TokenCommand::List => list_tokens(state, &user_id, json).await,
        TokenCommand::Delete { service } => delete_token(state, &user_id, &service, json).await,
    }
}

async fn set_token(
    state: &AppState,
    user_id: UserId,
    service: &str,
    value: Option<String>,
    refresh_token: Option<String>,
    json: bool,
) -> Result<()> {
    let value = match value {
        Some(v) => v,
        None => Password::new()
            .with_prompt(format!("Enter {} token", style(service).bold()))
            .interact()?,
    };
    if value.trim().is_empty() {
        bail!("token for {service} is empty");
    }

    let mut token = ServiceToken::new(user_id, service, value.trim());
    if let Some(refresh) = refresh_token {
        token = token.with_refresh_token(refresh);
    }
    state.credentials.save_token(&token).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"set": true, "service": service, "masked": token.token.masked()})
        );
    } else {
        println!(
            "  {} Token for '{}' set ({})",
            style("*").green().bold(),
            style(service).bold(),
            token.token.masked()
        );
        println!(
            "  {}",
            style("Running workflows pick it up after their next authorization failure.").dim()
        );
    }
    Ok(())
}

async fn list_tokens(state: &AppState, user_id: &UserId, json: bool) -> Result<()> {
    let tokens = state.credentials.get_service_tokens(user_id).await?;

    if json {
        let entries: Vec<_> = tokens
            .iter()
            .map(|t| {
                serde_json::json!({
                    "service": t.service,
                    "token": t.token.masked(),
                    "has_refresh_token": t.refresh_token.is_some(),
                    "updated_at": t.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if tokens.is_empty() {
        println!();
        println!(
            "  {} No tokens stored. Add one with: {}",
            style("i").blue().bold(),
            style("relay token set spotify").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Service").fg(Color::White),
        Cell::new("Token").fg(Color::White),
        Cell::new("Refresh").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for token in &tokens {
        table.add_row(vec![
            Cell::new(&token.service).fg(Color::Cyan),
            Cell::new(token.token.masked()),
            Cell::new(if token.refresh_token.is_some() { "yes" } else { "no" }),
            Cell::new(token.updated_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {}", style(plural(tokens.len(), "token")).bold());
    println!();
    Ok(())
}

async fn delete_token(state: &AppState, user_id: &UserId, service: &str, json: bool) -> Result<()> {
    if !state.credentials.delete_token(user_id, service).await? {
        bail!("no {service} token stored for user {user_id}");
    }

    if json {
        println!("{}", serde_json::json!({"deleted": true, "service": service}));
    } else {
        println!(
            "  {} Token for '{}' deleted",
            style("*").green().bold(),
            style(service).bold()
        );
    }
    Ok(())
}
