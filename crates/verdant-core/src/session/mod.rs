//! Session document and state machine.
//!
//! ```text
//! Idle -> Active <-> Paused -> Ended
//!           |                   ^
//!           +-------------------+
//! ```
//!
//! `Ended` is terminal until a new `start` creates a fresh session.

mod manager;

pub use manager::{smooth, SessionCommand, SessionManager};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Document, DocumentKey};

/// Phase of a session, derived from the persisted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Paused,
    Ended,
}

/// The `sessionState` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub active: bool,
    pub paused: bool,
    pub session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    pub focus_score: f64,
    pub focused_minutes: u32,
    pub distraction_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_timestamp: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            active: false,
            paused: false,
            session_id: String::new(),
            start_time: None,
            end_time: None,
            focus_score: 100.0,
            focused_minutes: 0,
            distraction_count: 0,
            last_activity_timestamp: Utc::now(),
        }
    }
}

impl Document for Session {
    const KEY: DocumentKey = DocumentKey::SessionState;
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        match (self.active, self.paused) {
            (true, true) => SessionPhase::Paused,
            (true, false) => SessionPhase::Active,
            (false, _) if self.start_time.is_some() => SessionPhase::Ended,
            (false, _) => SessionPhase::Idle,
        }
    }

    /// Active and not paused: the only phase in which ticks do anything.
    pub fn is_running(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    /// Wall-clock length of the session so far (or in total once ended).
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.start_time {
            Some(start) => self.end_time.unwrap_or(now) - start,
            None => chrono::Duration::zero(),
        }
    }
}
