use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Document, DocumentKey};

/// The `focusMetrics` document: raw attention signals between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusMetrics {
    pub active_url: Option<String>,
    pub active_tab_id: Option<i64>,
    pub window_focused: bool,
    pub tab_visible: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub current_site_arrival_time: DateTime<Utc>,
    pub tab_switch_count: u32,
    /// Last raw score scaled to `[0, 1]`; lower means more distracted.
    pub distraction_score: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_timestamp: DateTime<Utc>,
    /// Seconds since the last activity, as of the last idle check.
    pub inactivity_duration: f64,
    /// Start of the current run of low smoothed scores.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub low_focus_since: Option<DateTime<Utc>>,
}

impl Default for FocusMetrics {
    fn default() -> Self {
        Self::fresh(Utc::now())
    }
}

impl Document for FocusMetrics {
    const KEY: DocumentKey = DocumentKey::FocusMetrics;
}

impl FocusMetrics {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            active_url: None,
            active_tab_id: None,
            window_focused: true,
            tab_visible: true,
            current_site_arrival_time: now,
            tab_switch_count: 0,
            distraction_score: 1.0,
            last_activity_timestamp: now,
            inactivity_duration: 0.0,
            low_focus_since: None,
        }
    }

    pub fn time_on_site(&self, now: DateTime<Utc>) -> Duration {
        (now - self.current_site_arrival_time).max(Duration::zero())
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity_timestamp).max(Duration::zero())
    }
}
