//! `relay handlers`: print the handler catalogue.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use relay_core::handler::registry::HandlerKind;

use super::plural;
use crate::state::AppState;

pub fn list_handlers(state: &AppState, json: bool) -> Result<()> {
    let catalogue = state.registry.catalogue();

    if json {
        println!("{}", serde_json::to_string_pretty(&catalogue)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Handler").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
    ]);

    for entry in &catalogue {
        let kind_color = match entry.kind {
            HandlerKind::Action => Color::Yellow,
            HandlerKind::Reaction => Color::Green,
        };
        table.add_row(vec![
            Cell::new(format!("{}.{}", entry.service, entry.operation)).fg(Color::Cyan),
            Cell::new(entry.kind.to_string()).fg(kind_color),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {}", style(plural(catalogue.len(), "handler")).bold());
    println!();
    Ok(())
}
