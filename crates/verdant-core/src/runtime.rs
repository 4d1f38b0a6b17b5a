//! Periodic timer runtime.
//!
//! Three independent loops drive a [`FocusEngine`]: scoring, wildfire and
//! idle checks. Each tick's work runs in its own task, so a slow external
//! classification never holds up the next wildfire step. Loops stop when
//! [`Monitor::stop`] is called or once a tick observes that the session is
//! no longer active.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::FocusEngine;
use crate::error::Result;
use crate::events::Event;
use crate::session::Session;
use crate::storage::TimersConfig;

const EVENT_BUFFER: usize = 64;

pub struct Monitor {
    shutdown: Arc<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Spawn the loops on the current tokio runtime. Events produced by the
    /// ticks are forwarded to the returned receiver.
    pub fn start(engine: Arc<FocusEngine>, timers: &TimersConfig) -> (Self, mpsc::Receiver<Event>) {
        let (shutdown, _) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let mut monitor = Self {
            shutdown: Arc::new(shutdown),
            handles: Vec::with_capacity(3),
        };

        monitor.spawn_loop(
            "scoring",
            timers.scoring_interval(),
            &engine,
            &events_tx,
            |engine| async move { engine.focus_tick(Utc::now()).await },
        );
        monitor.spawn_loop(
            "wildfire",
            timers.wildfire_interval(),
            &engine,
            &events_tx,
            |engine| async move { engine.wildfire_tick(Utc::now()) },
        );
        monitor.spawn_loop(
            "idle",
            timers.idle_check_interval(),
            &engine,
            &events_tx,
            |engine| async move { engine.idle_check(Utc::now()) },
        );

        info!(
            scoring = ?timers.scoring_interval(),
            wildfire = ?timers.wildfire_interval(),
            idle = ?timers.idle_check_interval(),
            "monitor started"
        );
        (monitor, events_rx)
    }

    fn spawn_loop<F, Fut>(
        &mut self,
        name: &'static str,
        period: Duration,
        engine: &Arc<FocusEngine>,
        events: &mpsc::Sender<Event>,
        tick: F,
    ) where
        F: Fn(Arc<FocusEngine>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Event>>> + Send + 'static,
    {
        let engine = Arc::clone(engine);
        let events = events.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let mut shutdown_rx = self.shutdown.subscribe();
        let tick = Arc::new(tick);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(loop_name = name, "loop started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&engine);
                        let events = events.clone();
                        let shutdown = Arc::clone(&shutdown);
                        let tick = Arc::clone(&tick);
                        tokio::spawn(async move {
                            match (*tick)(Arc::clone(&engine)).await {
                                Ok(produced) => {
                                    for event in produced {
                                        // Receiver gone means nobody is listening; keep ticking.
                                        let _ = events.send(event).await;
                                    }
                                }
                                Err(e) => error!(loop_name = name, error = %e, "tick failed"),
                            }
                            stop_if_session_over(&engine, &shutdown);
                        });
                    }
                }
            }
            debug!(loop_name = name, "loop stopped");
        });
        self.handles.push(handle);
    }

    /// Signal every loop to stop. In-flight ticks may still finish.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the loops have been told to stop.
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Stop and wait for the loops to exit.
    pub async fn join(self) {
        self.stop();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "monitor loop panicked");
            }
        }
        info!("monitor stopped");
    }
}

fn stop_if_session_over(engine: &FocusEngine, shutdown: &watch::Sender<bool>) {
    match engine.store().get::<Session>() {
        Ok(session) if !session.active => {
            if !*shutdown.borrow() {
                info!("session no longer active, stopping monitor");
            }
            shutdown.send_replace(true);
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "could not read session state"),
    }
}
