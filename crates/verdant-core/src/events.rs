use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::focus::DistractionLevel;

/// Every state change in the simulation produces an Event.
/// Front ends print or forward them; the store stays the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: String,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: String,
        focused_minutes: u32,
        at: DateTime<Utc>,
    },
    /// Idle threshold exceeded; growth stops until activity resumes.
    SessionPaused {
        idle_secs: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        at: DateTime<Utc>,
    },
    FocusScored {
        raw_score: f64,
        smoothed_score: f64,
        distraction_level: DistractionLevel,
        at: DateTime<Utc>,
    },
    /// Navigated onto a listed distraction site.
    DistractionDetected {
        domain: String,
        penalty: f64,
        focus_score: f64,
        at: DateTime<Utc>,
    },
    TreePlanted {
        tree_id: String,
        at: DateTime<Utc>,
    },
    AnimalArrived {
        animal_id: String,
        kind: String,
        at: DateTime<Utc>,
    },
    WildfireIgnited {
        tree_id: String,
        at: DateTime<Utc>,
    },
    WildfireSpread {
        ignited: Vec<String>,
        burnt: Vec<String>,
        level: f64,
        at: DateTime<Utc>,
    },
    WildfireExtinguished {
        at: DateTime<Utc>,
    },
    WildfireBurnedOut {
        at: DateTime<Utc>,
    },
    TreesRecovered {
        tree_ids: Vec<String>,
        at: DateTime<Utc>,
    },
}
