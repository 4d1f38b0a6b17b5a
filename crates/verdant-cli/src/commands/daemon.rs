use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use verdant_core::Monitor;

use super::{open_engine, print_events, CliResult};

/// Drive the timers in the foreground. Resumes a persisted session or
/// starts a new one; exits when the session ends (from any front end) or on
/// Ctrl-C, which leaves the session running for the next `run`.
pub async fn run() -> CliResult {
    let engine = Arc::new(open_engine()?);
    let now = Utc::now();
    if engine.resume(now)? {
        info!("resumed running session");
    } else {
        print_events(&engine.start_session(now)?)?;
    }

    let timers = engine.config().timers.clone();
    let (monitor, mut events) = Monitor::start(Arc::clone(&engine), &timers);

    loop {
        tokio::select! {
            Some(event) = events.recv() => print_events(&[event])?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, session left running");
                break;
            }
            _ = monitor.stopped() => break,
        }
    }

    monitor.join().await;
    while let Ok(event) = events.try_recv() {
        print_events(&[event])?;
    }
    Ok(())
}
