//! CLI workflow management subcommands.
//!
//! Provides create, list, show, disable, enable and output operations. Outside
//! `relay serve` these only touch the store; a running `serve` picks changes
//! up on its next rescan.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use relay_types::error::WorkflowError;
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{
    CreateWorkflowRequest, HandlerDescriptor, HandlerKey, UserId, Workflow, WorkflowId,
};

use super::{plural, require_user};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Bind an action to a reaction.
    Create {
        /// Workflow name (defaults to "Workflow N").
        #[arg(long)]
        name: Option<String>,

        /// Action handler as service.operation (e.g. weather.feels_like).
        #[arg(long)]
        action: HandlerKey,

        /// Action options as a JSON object.
        #[arg(long, default_value = "{}")]
        action_options: String,

        /// Reaction handler as service.operation (e.g. spotify.add_track).
        #[arg(long)]
        reaction: HandlerKey,

        /// Reaction options as a JSON object.
        #[arg(long, default_value = "{}")]
        reaction_options: String,
    },

    /// List the user's workflows.
    #[command(alias = "ls")]
    List,

    /// Show one workflow in detail.
    Show {
        /// Workflow ID.
        id: WorkflowId,
    },

    /// Stop a workflow and keep it disabled.
    Disable {
        /// Workflow ID.
        id: WorkflowId,
    },

    /// Enable a disabled workflow again.
    Enable {
        /// Workflow ID.
        id: WorkflowId,
    },

    /// Show the latest reaction output (of one workflow, or all of the user's).
    Output {
        /// Workflow ID (omit for every workflow of the user).
        id: Option<WorkflowId>,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    user: Option<UserId>,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create {
            name,
            action,
            action_options,
            reaction,
            reaction_options,
        } => {
            let request = CreateWorkflowRequest {
                user_id: require_user(user)?,
                name,
                action: descriptor(action, &action_options, "--action-options")?,
                reaction: descriptor(reaction, &reaction_options, "--reaction-options")?,
            };
            handle_create(request, state, json).await
        }
        WorkflowCommand::List => handle_list(require_user(user)?, state, json).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Disable { id } => handle_toggle(&id, false, state, json).await,
        WorkflowCommand::Enable { id } => handle_toggle(&id, true, state, json).await,
        WorkflowCommand::Output { id } => handle_output(id, user, state, json).await,
    }
}

fn descriptor(key: HandlerKey, options: &str, flag: &str) -> Result<HandlerDescriptor> {
    let options: Value =
        serde_json::from_str(options).with_context(|| format!("{flag} is not valid JSON"))?;
    if !options.is_object() {
        anyhow::bail!("{flag} must be a JSON object");
    }
    Ok(HandlerDescriptor::new(key.service, key.operation, options))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(request: CreateWorkflowRequest, state: &AppState, json: bool) -> Result<()> {
    let workflow = match state.workflow_service.create(request).await {
        Ok(workflow) => workflow,
        Err(err @ (WorkflowError::UnknownAction(_) | WorkflowError::UnknownReaction(_))) => {
            return Err(anyhow::Error::new(err).context("see `relay handlers` for the catalogue"));
        }
        Err(err) => return Err(err.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created workflow '{}'",
        style("*").green().bold(),
        style(&workflow.name).cyan()
    );
    println!("  ID:       {}", workflow.id);
    println!("  Action:   {}", workflow.action.key());
    println!("  Reaction: {}", workflow.reaction.key());
    if state.supervisor().is_none() {
        println!(
            "  {}",
            style("It starts with the next `relay serve` rescan.").dim()
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(user_id: UserId, state: &AppState, json: bool) -> Result<()> {
    let workflows = state.workflow_service.list_for_user(&user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!(
            "  {} No workflows yet. Create one with: {}",
            style("i").blue().bold(),
            style("relay workflow create --action <service.op> --reaction <service.op>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Action").fg(Color::White),
        Cell::new("Reaction").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for workflow in &workflows {
        table.add_row(vec![
            Cell::new(workflow.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&workflow.name).fg(Color::Cyan),
            Cell::new(workflow.action.key().to_string()),
            Cell::new(workflow.reaction.key().to_string()),
            status_cell(workflow),
            Cell::new(workflow.updated_at.format("%Y-%m-%d %H:%M").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {}", style(plural(workflows.len(), "workflow")).bold());
    println!();
    Ok(())
}

fn status_cell(workflow: &Workflow) -> Cell {
    match (workflow.active, workflow.trigger_flag) {
        (false, _) => Cell::new("disabled").fg(Color::DarkGrey),
        (true, true) => Cell::new("triggered").fg(Color::Yellow),
        (true, false) => Cell::new("active").fg(Color::Green),
    }
}

async fn handle_show(id: &WorkflowId, state: &AppState, json: bool) -> Result<()> {
    let workflow = state
        .workflow_service
        .get(id)
        .await
        .with_context(|| format!("workflow {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(&workflow.name).cyan().bold(),
        style(format!("({})", workflow.id)).dim()
    );
    println!();
    println!("  Owner:     {}", workflow.user_id);
    println!(
        "  Status:    {}",
        match (workflow.active, workflow.trigger_flag) {
            (false, _) => style("disabled").dim().to_string(),
            (true, true) => style("triggered, reaction pending").yellow().to_string(),
            (true, false) => style("active").green().to_string(),
        }
    );
    println!("  Action:    {}", workflow.action.key());
    println!("             {}", workflow.action.options);
    println!("  Reaction:  {}", workflow.reaction.key());
    println!("             {}", workflow.reaction.options);
    println!("  State:     {}", workflow.accumulated_state);
    println!(
        "  Created:   {}",
        workflow.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Updated:   {}",
        workflow.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Disable / Enable
// ---------------------------------------------------------------------------

async fn handle_toggle(id: &WorkflowId, enable: bool, state: &AppState, json: bool) -> Result<()> {
    if enable {
        state
            .workflow_service
            .reactivate(id)
            .await
            .with_context(|| format!("workflow {id}"))?;
    } else {
        state
            .workflow_service
            .deactivate(id)
            .await
            .with_context(|| format!("workflow {id}"))?;
    }

    if json {
        println!(
            "{}",
            serde_json::json!({"id": id.to_string(), "active": enable})
        );
    } else {
        let verb = if enable { "Enabled" } else { "Disabled" };
        println!("  {} {verb} workflow {id}", style("*").green().bold());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

async fn handle_output(
    id: Option<WorkflowId>,
    user: Option<UserId>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let outputs: Vec<ReactionOutput> = match id {
        Some(id) => state
            .workflow_service
            .latest_reaction_output(&id)
            .await?
            .into_iter()
            .collect(),
        None => {
            let user_id = require_user(user)?;
            state
                .workflow_service
                .latest_reaction_outputs(&user_id)
                .await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    if outputs.is_empty() {
        println!();
        println!("  {} No reaction output yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    for output in &outputs {
        println!();
        println!(
            "  {} {}",
            style(output.workflow_id).cyan(),
            style(output.produced_at.format("%Y-%m-%d %H:%M:%S UTC")).dim()
        );
        let pretty = serde_json::to_string_pretty(&output.payload)?;
        for line in pretty.lines() {
            println!("    {line}");
        }
    }
    println!();
    Ok(())
}
