//! Engine orchestration.
//!
//! [`FocusEngine`] wires the session manager, scorer, growth and wildfire
//! engines together. It holds no simulation state of its own: every
//! operation reads the documents it needs from the [`SharedStateStore`] and
//! writes back through compare-and-swap updates, so the timer loops, the
//! command surface and one-shot CLI invocations can all drive the same
//! store.
//!
//! Forest writes re-check the owning session inside the update closure. A
//! tick that was started for a session which has since ended, or been
//! replaced, leaves the forest alone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, ScoringError};
use crate::events::Event;
use crate::focus::{
    ActivityEvent, ActivityMonitor, ApiConfig, ChatClient, DistractionLevel, DistractionSites,
    FocusAnalysis, FocusMetrics, FocusScorer, ScoringInput,
};
use crate::forest::{FireSignal, ForestGrowthEngine, ForestState, LowFocusTracker, WildfireEngine};
use crate::session::{Session, SessionManager};
use crate::storage::{Config, SharedStateStore};

const API_TEST_PROMPT: &str = "Say \"API test successful\" if you can read this.";

/// Outcome of [`FocusEngine::test_api`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCheck {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl ApiCheck {
    fn passed(message: impl Into<String>, reply: Option<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            reply,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            reply: None,
        }
    }
}

/// Scoring strategy together with the settings it was built from.
struct ScorerSlot {
    api: ApiConfig,
    scorer: Arc<FocusScorer>,
}

/// Orchestrates one focus forest over a shared store.
pub struct FocusEngine {
    store: SharedStateStore,
    config: Config,
    sessions: SessionManager,
    growth: ForestGrowthEngine,
    wildfire: WildfireEngine,
    tracker: LowFocusTracker,
    monitor: ActivityMonitor,
    scorer: RwLock<ScorerSlot>,
    rng: Mutex<Mcg128Xsl64>,
}

impl std::fmt::Debug for FocusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusEngine")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl FocusEngine {
    /// Build an engine over `store`. The scoring strategy is taken from the
    /// stored `apiConfig` document.
    pub fn new(store: SharedStateStore, config: Config) -> Result<Self> {
        let api: ApiConfig = store.get()?;
        let scorer = FocusScorer::from_config(store.clone(), &api, request_timeout(&config));

        let rng = match config.wildfire.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };

        Ok(Self {
            sessions: SessionManager::new(config.session.idle_threshold()?),
            growth: ForestGrowthEngine::default(),
            wildfire: WildfireEngine::default(),
            tracker: LowFocusTracker {
                ignite_below: config.wildfire.ignite_below,
                ignite_after: config.wildfire.ignite_after()?,
                extinguish_above: config.wildfire.extinguish_above,
            },
            monitor: ActivityMonitor::new(config.scoring.tab_switch_policy),
            scorer: RwLock::new(ScorerSlot {
                api,
                scorer: Arc::new(scorer),
            }),
            rng: Mutex::new(rng),
            store,
            config,
        })
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rebuild the scoring strategy from the stored `apiConfig`. Returns
    /// whether the external analyzer is now in use.
    pub async fn reload_scorer(&self) -> Result<bool> {
        let api: ApiConfig = self.store.get()?;
        let scorer = FocusScorer::from_config(self.store.clone(), &api, request_timeout(&self.config));
        let external = scorer.is_external();
        info!(provider = api.provider.as_str(), external, "scorer reloaded");
        *self.scorer.write().await = ScorerSlot {
            api,
            scorer: Arc::new(scorer),
        };
        Ok(external)
    }

    pub async fn is_external(&self) -> bool {
        self.scorer.read().await.scorer.is_external()
    }

    /// Current strategy, rebuilt first if another front end changed
    /// `apiConfig` since it was built.
    async fn current_scorer(&self) -> Result<Arc<FocusScorer>> {
        let api: ApiConfig = self.store.get()?;
        {
            let slot = self.scorer.read().await;
            if slot.api == api {
                return Ok(Arc::clone(&slot.scorer));
            }
        }
        self.reload_scorer().await?;
        Ok(Arc::clone(&self.scorer.read().await.scorer))
    }

    /// Start a session with fresh metrics and a freshly planted forest.
    /// A session that is already active is left alone.
    pub fn start_session(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let started = self
            .store
            .update::<Session, _, _>(|s| self.sessions.start(s, now))?;
        let Some(session_id) = started else {
            debug!("start requested while a session is active");
            return Ok(Vec::new());
        };

        self.store.set(&FocusMetrics::fresh(now))?;

        let mut forest = ForestState::for_session(session_id.clone(), now);
        self.growth.plant_initial_forest(&mut forest, &mut *self.rng());
        self.store.set(&forest)?;

        Ok(vec![Event::SessionStarted {
            session_id,
            at: now,
        }])
    }

    /// End the running session. The forest is kept as it stands but stops
    /// accepting timer writes.
    pub fn end_session(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let ended = self.store.update::<Session, _, _>(|s| {
            self.sessions
                .end(s, now)
                .then(|| (s.session_id.clone(), s.focused_minutes))
        })?;
        let Some((session_id, focused_minutes)) = ended else {
            return Ok(Vec::new());
        };

        self.store.update::<ForestState, _, _>(|forest| {
            if forest.session_id == session_id {
                forest.session_active = false;
                forest.last_update = now;
            }
        })?;

        Ok(vec![Event::SessionEnded {
            session_id,
            focused_minutes,
            at: now,
        }])
    }

    /// Reattach to a session persisted by an earlier process. Returns
    /// whether there was one to resume.
    pub fn resume(&self, now: DateTime<Utc>) -> Result<bool> {
        let resumed = self
            .store
            .update::<Session, _, _>(|s| self.sessions.resume_after_restart(s, now))?;
        if resumed {
            self.store.update::<FocusMetrics, _, _>(|m| {
                m.last_activity_timestamp = now;
                m.inactivity_duration = 0.0;
            })?;
            info!("resumed persisted session");
        }
        Ok(resumed)
    }

    /// Any user input: refresh the idle clocks and wake a paused session.
    pub fn handle_activity(&self, event: &ActivityEvent) -> Result<Vec<Event>> {
        self.store
            .update::<FocusMetrics, _, _>(|m| self.monitor.record_activity(m, event))?;
        let resumed = self
            .store
            .update::<Session, _, _>(|s| self.sessions.touch_activity(s, event.timestamp))?;

        Ok(if resumed {
            vec![Event::SessionResumed { at: event.timestamp }]
        } else {
            Vec::new()
        })
    }

    /// Window focus changed. Coming back to the window wakes a paused
    /// session.
    pub fn handle_window_focus(&self, focused: bool, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.store
            .update::<FocusMetrics, _, _>(|m| self.monitor.record_window_focus(m, focused, now))?;
        if !focused {
            return Ok(Vec::new());
        }
        let resumed = self
            .store
            .update::<Session, _, _>(|s| self.sessions.touch_activity(s, now))?;
        Ok(if resumed {
            vec![Event::SessionResumed { at: now }]
        } else {
            Vec::new()
        })
    }

    pub fn handle_visibility(&self, visible: bool) -> Result<()> {
        self.store
            .update::<FocusMetrics, _, _>(|m| self.monitor.record_visibility(m, visible))?;
        Ok(())
    }

    /// Navigation in a tab. Landing on a listed distraction site costs an
    /// immediate penalty.
    pub fn handle_tab_change(&self, tab_id: i64, url: &str, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let change = self
            .store
            .update::<FocusMetrics, _, _>(|m| self.monitor.record_tab_change(m, tab_id, url, now))?;

        let mut events = Vec::new();
        let resumed = self
            .store
            .update::<Session, _, _>(|s| self.sessions.touch_activity(s, now))?;
        if resumed {
            events.push(Event::SessionResumed { at: now });
        }

        if !change.new_site {
            return Ok(events);
        }
        let sites: DistractionSites = self.store.get()?;
        let Some(penalty) = sites.penalty_for(url) else {
            return Ok(events);
        };

        let penalised = self.store.update::<Session, _, _>(|s| {
            self.sessions.record_distraction(s);
            self.sessions.apply_penalty(s, penalty * 100.0)
        })?;
        if let Some(focus_score) = penalised {
            let domain = change.domain.unwrap_or_else(|| url.to_string());
            info!(%domain, penalty, focus_score, "distraction site visited");
            events.push(Event::DistractionDetected {
                domain,
                penalty,
                focus_score,
                at: now,
            });
        }
        Ok(events)
    }

    /// Pause the session if both idle clocks are older than the threshold.
    pub fn idle_check(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let session: Session = self.store.get()?;
        if !session.is_running() {
            return Ok(Vec::new());
        }

        let threshold = self.sessions.idle_threshold();
        let metrics_activity = self.store.update::<FocusMetrics, _, _>(|m| {
            self.monitor.check_inactivity(m, threshold, now);
            m.last_activity_timestamp
        })?;

        let (paused, last_activity) = self.store.update::<Session, _, _>(|s| {
            let last = metrics_activity.max(s.last_activity_timestamp);
            (self.sessions.check_idle(s, last, now), last)
        })?;

        if !paused {
            return Ok(Vec::new());
        }
        let idle_secs = (now - last_activity).num_seconds().max(0) as u64;
        info!(idle_secs, "session paused for inactivity");
        Ok(vec![Event::SessionPaused { idle_secs, at: now }])
    }

    /// One scoring tick: score, smooth, grow, and light or put out fires.
    pub async fn focus_tick(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let session: Session = self.store.get()?;
        if !session.is_running() {
            debug!("focus tick skipped, no running session");
            return Ok(Vec::new());
        }

        let mut events = self.idle_check(now)?;
        if !events.is_empty() {
            return Ok(events);
        }

        let metrics: FocusMetrics = self.store.get()?;
        let analysis = match metrics.active_url.clone() {
            Some(current_url) => {
                let input = ScoringInput {
                    current_url,
                    tab_switch_count: metrics.tab_switch_count,
                    time_on_site: metrics.time_on_site(now),
                    session_duration: session.duration(now),
                    distraction_site_visits: session.distraction_count,
                };
                let scorer = self.current_scorer().await?;
                scorer.score(&input, now).await
            }
            None => FocusAnalysis {
                focus_score: 100.0,
                distraction_level: DistractionLevel::Low,
                reasoning: "No page loaded yet".to_string(),
                suggestions: Vec::new(),
            },
        };

        let growth_threshold = self.config.session.growth_threshold;
        let scored = self.store.update::<Session, _, _>(|s| {
            if s.session_id != session.session_id {
                return None;
            }
            let smoothed = self.sessions.update_focus_score(s, analysis.focus_score)?;
            let focused = smoothed > growth_threshold;
            if focused {
                self.sessions.record_focused_minute(s);
            }
            Some((smoothed, focused, s.clone()))
        })?;
        let Some((smoothed, focused, session)) = scored else {
            debug!("session changed during scoring, dropping tick");
            return Ok(events);
        };

        debug!(raw = analysis.focus_score, smoothed, focused, "focus scored");
        events.push(Event::FocusScored {
            raw_score: analysis.focus_score,
            smoothed_score: smoothed,
            distraction_level: analysis.distraction_level,
            at: now,
        });

        let signal = self.store.update::<FocusMetrics, _, _>(|m| {
            m.distraction_score = (analysis.focus_score / 100.0).clamp(0.0, 1.0);
            let signal = self.tracker.observe(&mut m.low_focus_since, smoothed, now);
            self.monitor.end_tick(m);
            signal
        })?;

        events.extend(self.advance_forest(&session, focused, signal, now)?);
        Ok(events)
    }

    fn advance_forest(
        &self,
        session: &Session,
        focused: bool,
        signal: FireSignal,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let events = self.store.update::<ForestState, _, _>(|forest| {
            let mut events = Vec::new();
            if !forest.accepts_writes_for(&session.session_id) {
                return events;
            }
            let mut rng = self.rng();

            if focused {
                if let Some(tree) = self.growth.tick(session, forest, &mut *rng, now) {
                    events.push(Event::TreePlanted {
                        tree_id: tree.id,
                        at: now,
                    });
                    if self.growth.animal_due(forest.focus_minutes) {
                        let animal = self.growth.spawn_animal(forest, &mut *rng);
                        events.push(Event::AnimalArrived {
                            animal_id: animal.id,
                            kind: animal.kind,
                            at: now,
                        });
                    }
                }
            }

            match signal {
                FireSignal::Ignite => {
                    if let Some(tree_id) = self.wildfire.start(forest, &mut *rng, now) {
                        events.push(Event::WildfireIgnited { tree_id, at: now });
                    }
                }
                FireSignal::Extinguish if forest.wildfire.active => {
                    self.wildfire.stop(forest, now);
                    events.push(Event::WildfireExtinguished { at: now });
                    let tree_ids = self.wildfire.recover_trees(forest);
                    if !tree_ids.is_empty() {
                        events.push(Event::TreesRecovered { tree_ids, at: now });
                    }
                }
                _ => {}
            }
            events
        })?;
        Ok(events)
    }

    /// One wildfire tick: escalate an active fire, or heal recovering trees
    /// while the forest is calm. A paused session keeps burning.
    pub fn wildfire_tick(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let session: Session = self.store.get()?;
        if !session.active {
            return Ok(Vec::new());
        }

        let events = self.store.update::<ForestState, _, _>(|forest| {
            let mut events = Vec::new();
            if !forest.accepts_writes_for(&session.session_id) {
                return events;
            }

            if forest.wildfire.active {
                let update = self.wildfire.update(forest, &mut *self.rng(), now);
                if !update.ignited.is_empty() || !update.burnt.is_empty() {
                    events.push(Event::WildfireSpread {
                        ignited: update.ignited,
                        burnt: update.burnt,
                        level: forest.wildfire.level,
                        at: now,
                    });
                }
                if update.burned_out {
                    events.push(Event::WildfireBurnedOut { at: now });
                }
            } else {
                let tree_ids = self.wildfire.recover_trees(forest);
                if !tree_ids.is_empty() {
                    forest.last_update = now;
                    events.push(Event::TreesRecovered { tree_ids, at: now });
                }
            }
            events
        })?;
        Ok(events)
    }

    /// Check the configured provider with a tiny completion.
    pub async fn test_api(&self) -> Result<ApiCheck> {
        let api: ApiConfig = self.store.get()?;
        let client = match ChatClient::from_config(&api, request_timeout(&self.config)) {
            Ok(Some(client)) => client,
            Ok(None) | Err(ScoringError::MissingCredential { .. }) => {
                return Ok(ApiCheck::passed(
                    "Using mock mode (no API key set). Set an OpenAI API key to test.",
                    None,
                ))
            }
            Err(e) => return Ok(ApiCheck::failed(format!("Connection error: {e}"))),
        };

        Ok(match client.complete_text(API_TEST_PROMPT, 20).await {
            Ok(reply) => ApiCheck::passed("OpenAI API is working!", Some(reply)),
            Err(ScoringError::Status { status, body }) => {
                ApiCheck::failed(format!("API Error: {status} - {}", error_message(&body)))
            }
            Err(e) => ApiCheck::failed(format!("Connection error: {e}")),
        })
    }

    fn rng(&self) -> MutexGuard<'_, Mcg128Xsl64> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn request_timeout(config: &Config) -> StdDuration {
    StdDuration::from_secs(config.scoring.request_timeout_secs.max(1))
}

/// `error.message` from an OpenAI-style error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}
