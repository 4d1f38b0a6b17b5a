pub mod api;
pub mod config;
pub mod daemon;
pub mod focus;
pub mod forest;
pub mod rpc;
pub mod session;
pub mod sites;

use serde::Serialize;
use verdant_core::storage::{Config, Database, SharedStateStore};
use verdant_core::{Event, FocusEngine};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Store over the on-disk database shared with any running daemon.
pub fn open_store() -> Result<SharedStateStore, Box<dyn std::error::Error>> {
    Ok(SharedStateStore::new(Database::open()?))
}

pub fn open_engine() -> Result<FocusEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(FocusEngine::new(open_store()?, config)?)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One JSON object per line.
pub fn print_events(events: &[Event]) -> CliResult {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
