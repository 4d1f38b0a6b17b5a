use chrono::Utc;
use verdant_core::focus::{ActivityEvent, ActivityKind, FocusMetrics};
use verdant_core::Session;

use super::{open_engine, open_store, print_events, print_json, CliResult};

pub fn metrics() -> CliResult {
    let metrics: FocusMetrics = open_store()?.get()?;
    print_json(&metrics)
}

pub fn activity(kind: &str) -> CliResult {
    let kind: ActivityKind = kind.parse()?;
    let engine = open_engine()?;
    print_events(&engine.handle_activity(&ActivityEvent::new(kind, Utc::now()))?)
}

pub fn tab(tab_id: i64, url: &str) -> CliResult {
    let engine = open_engine()?;
    print_events(&engine.handle_tab_change(tab_id, url, Utc::now())?)
}

pub fn window(focused: bool) -> CliResult {
    let engine = open_engine()?;
    print_events(&engine.handle_window_focus(focused, Utc::now())?)
}

pub async fn analyze() -> CliResult {
    let engine = open_engine()?;
    let session: Session = engine.store().get()?;
    if !session.is_running() {
        eprintln!("no running session, nothing to analyze");
        return Ok(());
    }
    print_events(&engine.focus_tick(Utc::now()).await?)
}
