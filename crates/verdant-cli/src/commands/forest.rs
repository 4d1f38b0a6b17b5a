use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use verdant_core::ForestState;

use super::{open_engine, open_store, print_events, print_json, CliResult};

#[derive(Subcommand)]
pub enum WildfireAction {
    /// Run one escalation (or recovery) step now
    Tick,
    /// Print the wildfire block
    Status,
}

pub fn show(full: bool) -> CliResult {
    let forest: ForestState = open_store()?.get()?;
    if full {
        return print_json(&forest);
    }
    print_json(&json!({
        "sessionId": forest.session_id,
        "sessionActive": forest.session_active,
        "focusMinutes": forest.focus_minutes,
        "trees": forest.summary(),
        "wildfire": {
            "active": forest.wildfire.active,
            "level": forest.wildfire.level,
            "affected": forest.wildfire.affected_tree_ids.len(),
        },
    }))
}

pub fn wildfire(action: WildfireAction) -> CliResult {
    match action {
        WildfireAction::Tick => {
            let engine = open_engine()?;
            print_events(&engine.wildfire_tick(Utc::now())?)
        }
        WildfireAction::Status => {
            let forest: ForestState = open_store()?.get()?;
            print_json(&forest.wildfire)
        }
    }
}
