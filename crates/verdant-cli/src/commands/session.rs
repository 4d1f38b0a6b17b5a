use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use verdant_core::Session;

use super::{open_engine, print_events, print_json, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a focus session (plants a fresh forest)
    Start,
    /// End the running session
    End,
    /// Print the session state as JSON
    Status,
}

pub fn run(action: SessionAction) -> CliResult {
    let engine = open_engine()?;
    let now = Utc::now();

    match action {
        SessionAction::Start => {
            let events = engine.start_session(now)?;
            if events.is_empty() {
                eprintln!("a session is already running");
            }
            print_events(&events)?;
        }
        SessionAction::End => {
            let events = engine.end_session(now)?;
            if events.is_empty() {
                eprintln!("no session to end");
            }
            print_events(&events)?;
        }
        SessionAction::Status => {
            let session: Session = engine.store().get()?;
            print_json(&json!({
                "phase": session.phase(),
                "durationSecs": session.duration(now).num_seconds(),
                "session": session,
            }))?;
        }
    }
    Ok(())
}
