//! Activity and navigation signals.
//!
//! Only cross-domain navigations count as tab switches; reloads and in-site
//! links do not. A URL that can't be parsed is counted, never dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::domain_of;
use super::metrics::FocusMetrics;
use crate::storage::TabSwitchPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Keyboard,
    Mouse,
    Scroll,
    TabSwitch,
    UrlChange,
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyboard" => Ok(ActivityKind::Keyboard),
            "mouse" => Ok(ActivityKind::Mouse),
            "scroll" => Ok(ActivityKind::Scroll),
            "tab_switch" => Ok(ActivityKind::TabSwitch),
            "url_change" => Ok(ActivityKind::UrlChange),
            other => Err(format!("unknown activity type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            data: None,
        }
    }
}

/// Outcome of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabChange {
    pub counted_as_switch: bool,
    /// Arrived on a different site (or the first site of the session).
    pub new_site: bool,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityMonitor {
    policy: TabSwitchPolicy,
}

impl ActivityMonitor {
    pub fn new(policy: TabSwitchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TabSwitchPolicy {
        self.policy
    }

    /// Any input refreshes the idle clock.
    pub fn record_activity(&self, metrics: &mut FocusMetrics, event: &ActivityEvent) {
        if event.timestamp > metrics.last_activity_timestamp {
            metrics.last_activity_timestamp = event.timestamp;
        }
        metrics.inactivity_duration = 0.0;
    }

    /// Browser window gained or lost focus. Returning to it counts as input.
    pub fn record_window_focus(&self, metrics: &mut FocusMetrics, focused: bool, now: DateTime<Utc>) {
        metrics.window_focused = focused;
        if focused {
            self.record_activity(metrics, &ActivityEvent::new(ActivityKind::TabSwitch, now));
        }
    }

    pub fn record_visibility(&self, metrics: &mut FocusMetrics, visible: bool) {
        metrics.tab_visible = visible;
    }

    pub fn record_tab_change(
        &self,
        metrics: &mut FocusMetrics,
        tab_id: i64,
        url: &str,
        now: DateTime<Utc>,
    ) -> TabChange {
        let domain = domain_of(url);
        let counted = match (&metrics.active_url, &domain) {
            // First navigation of the session.
            (None, _) => false,
            (Some(_), None) => true,
            (Some(previous), Some(next)) => domain_of(previous).as_ref() != Some(next),
        };

        let new_site = counted || metrics.active_url.is_none();
        if counted {
            metrics.tab_switch_count += 1;
        }
        if new_site {
            metrics.current_site_arrival_time = now;
        }
        metrics.active_tab_id = Some(tab_id);
        metrics.active_url = Some(url.to_string());
        metrics.last_activity_timestamp = now;
        metrics.inactivity_duration = 0.0;

        debug!(tab_id, ?domain, counted, "tab change");
        TabChange {
            counted_as_switch: counted,
            new_site,
            domain,
        }
    }

    /// Refresh `inactivity_duration` and report whether the idle threshold
    /// has been exceeded.
    pub fn check_inactivity(
        &self,
        metrics: &mut FocusMetrics,
        threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let idle = metrics.idle_for(now);
        metrics.inactivity_duration = idle.num_milliseconds() as f64 / 1000.0;
        idle > threshold
    }

    /// Called after each scoring tick.
    pub fn end_tick(&self, metrics: &mut FocusMetrics) {
        if self.policy == TabSwitchPolicy::PerTick {
            metrics.tab_switch_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn same_domain_navigation_is_not_a_switch() {
        let monitor = ActivityMonitor::default();
        let t0 = Utc::now();
        let mut m = FocusMetrics::fresh(t0);

        let first = monitor.record_tab_change(&mut m, 1, "https://github.com/a", t0);
        assert!(!first.counted_as_switch);
        assert!(first.new_site);
        let arrival = m.current_site_arrival_time;

        let t1 = t0 + Duration::seconds(30);
        let same = monitor.record_tab_change(&mut m, 1, "https://www.github.com/b", t1);
        assert!(!same.counted_as_switch);
        assert!(!same.new_site);
        assert_eq!(m.tab_switch_count, 0);
        assert_eq!(m.current_site_arrival_time, arrival);

        let t2 = t0 + Duration::seconds(60);
        let other = monitor.record_tab_change(&mut m, 2, "https://reddit.com", t2);
        assert!(other.counted_as_switch);
        assert_eq!(m.tab_switch_count, 1);
        assert_eq!(m.current_site_arrival_time, t2);
        assert_eq!(m.active_tab_id, Some(2));
    }

    #[test]
    fn window_focus_flags_and_refreshes_on_return() {
        let monitor = ActivityMonitor::default();
        let t0 = Utc::now();
        let mut m = FocusMetrics::fresh(t0);

        let t1 = t0 + Duration::seconds(90);
        monitor.record_window_focus(&mut m, false, t1);
        assert!(!m.window_focused);
        assert_eq!(m.last_activity_timestamp, t0);

        let t2 = t0 + Duration::seconds(120);
        monitor.record_window_focus(&mut m, true, t2);
        assert!(m.window_focused);
        assert_eq!(m.last_activity_timestamp, t2);

        monitor.record_visibility(&mut m, false);
        assert!(!m.tab_visible);
    }

    #[test]
    fn unparsable_url_counts_as_switch() {
        let monitor = ActivityMonitor::default();
        let now = Utc::now();
        let mut m = FocusMetrics::fresh(now);
        monitor.record_tab_change(&mut m, 1, "https://github.com", now);
        let change = monitor.record_tab_change(&mut m, 1, "::::", now);
        assert!(change.counted_as_switch);
        assert_eq!(change.domain, None);
        assert_eq!(m.tab_switch_count, 1);
    }

    #[test]
    fn reset_policy() {
        let now = Utc::now();
        let mut m = FocusMetrics::fresh(now);
        m.tab_switch_count = 4;
        ActivityMonitor::new(TabSwitchPolicy::PerSession).end_tick(&mut m);
        assert_eq!(m.tab_switch_count, 4);
        ActivityMonitor::new(TabSwitchPolicy::PerTick).end_tick(&mut m);
        assert_eq!(m.tab_switch_count, 0);
    }

    #[test]
    fn inactivity_threshold() {
        let monitor = ActivityMonitor::default();
        let t0 = Utc::now();
        let mut m = FocusMetrics::fresh(t0);
        assert!(!monitor.check_inactivity(&mut m, Duration::minutes(5), t0 + Duration::minutes(4)));
        assert_eq!(m.inactivity_duration, 240.0);
        assert!(monitor.check_inactivity(&mut m, Duration::minutes(5), t0 + Duration::minutes(6)));

        let event = ActivityEvent::new(ActivityKind::Mouse, t0 + Duration::minutes(6));
        monitor.record_activity(&mut m, &event);
        assert_eq!(m.inactivity_duration, 0.0);
        assert!(!monitor.check_inactivity(&mut m, Duration::minutes(5), t0 + Duration::minutes(7)));
    }

    #[test]
    fn event_json_uses_type_tag() {
        let event: ActivityEvent =
            serde_json::from_str(r#"{"type":"tab_switch","timestamp":1700000000000}"#).unwrap();
        assert_eq!(event.kind, ActivityKind::TabSwitch);
        assert_eq!("url_change".parse::<ActivityKind>().unwrap(), ActivityKind::UrlChange);
    }
}
