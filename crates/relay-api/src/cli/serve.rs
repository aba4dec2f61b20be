//! `relay serve`: run the engine in the foreground.
//!
//! Resumes every active workflow, then rescans the store on a fixed interval
//! so workflows created or enabled by other `relay` invocations start without
//! a restart. Exits on Ctrl+C or SIGTERM after cancelling all cycles.

use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// How long cycles get to wind down once cancelled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn serve(
    state: &AppState,
    shutdown: impl Future<Output = ()>,
    quiet: bool,
) -> Result<()> {
    let supervisor = state
        .supervisor()
        .context("serve requires a supervised application state")?;

    let resumed = state.workflow_service.resume_active().await?;
    if !quiet {
        println!();
        println!(
            "  {} Relay running {} (poll every {}s, rescan every {}s)",
            style("⚡").bold(),
            style(super::plural(resumed, "workflow")).cyan(),
            state.config.poll_interval_secs,
            state.config.rescan_interval_secs,
        );
        println!("  Data directory: {}", state.data_dir.display());
        println!("  {}", style("Press Ctrl+C to stop").dim());
        println!();
    }

    let mut rescan = tokio::time::interval(state.config.rescan_interval());
    rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; resume_active just ran.
    rescan.tick().await;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = rescan.tick() => {
                match state.workflow_service.resume_active().await {
                    Ok(0) => {}
                    Ok(started) => tracing::info!(started, "rescan started workflows"),
                    Err(err) => tracing::warn!(error = %err, "rescan failed"),
                }
            }
        }
    }

    let running = supervisor.running_count();
    tracing::info!(running, "shutting down");
    let clean = supervisor.shutdown(SHUTDOWN_GRACE).await;

    if !quiet {
        println!();
        if clean {
            println!("  Stopped {}.", super::plural(running, "workflow"));
        } else {
            println!("  Stopped with cycles still winding down.");
        }
    }
    Ok(())
}
