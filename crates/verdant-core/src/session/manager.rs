//! Session state machine and focus-score smoothing.
//!
//! The manager is stateless apart from its thresholds: every operation takes
//! the `Session` document it should act on, so the engine can run it inside a
//! store update. Transitions not in the table are no-ops.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Session, SessionPhase};

/// Weight kept from the current score when the raw sample is higher.
const RECOVERY_KEEP: f64 = 0.05;
/// Weight kept from the current score when the raw sample is lower or equal.
const DECLINE_KEEP: f64 = 0.4;

/// Commands that move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Pause,
    Resume,
    End,
}

impl SessionCommand {
    /// Transition table. `None` means the command is not allowed from `from`.
    pub fn next_phase(self, from: SessionPhase) -> Option<SessionPhase> {
        use SessionCommand::*;
        use SessionPhase::*;
        match (from, self) {
            (Idle | Ended, Start) => Some(Active),
            (Active, Pause) => Some(Paused),
            (Paused, Resume) => Some(Active),
            (Active | Paused, End) => Some(Ended),
            _ => None,
        }
    }
}

/// Asymmetric exponential smoothing: recovery is fast, decline is slower.
pub fn smooth(current: f64, raw: f64) -> f64 {
    let raw = raw.clamp(0.0, 100.0);
    let next = if raw > current {
        current * RECOVERY_KEEP + raw * (1.0 - RECOVERY_KEEP)
    } else {
        current * DECLINE_KEEP + raw * (1.0 - DECLINE_KEEP)
    };
    next.clamp(0.0, 100.0)
}

/// Owns the session transitions and score updates.
#[derive(Debug, Clone)]
pub struct SessionManager {
    idle_threshold: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

impl SessionManager {
    pub fn new(idle_threshold: Duration) -> Self {
        Self { idle_threshold }
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Apply a transition. Returns `false` (and leaves the session untouched)
    /// for transitions outside the table.
    pub fn apply(&self, session: &mut Session, command: SessionCommand, now: DateTime<Utc>) -> bool {
        let from = session.phase();
        let Some(to) = command.next_phase(from) else {
            debug!(?from, ?command, "ignoring session transition");
            return false;
        };

        match to {
            SessionPhase::Active if command == SessionCommand::Start => {
                *session = Session {
                    active: true,
                    paused: false,
                    session_id: Uuid::new_v4().to_string(),
                    start_time: Some(now),
                    end_time: None,
                    focus_score: 100.0,
                    focused_minutes: 0,
                    distraction_count: 0,
                    last_activity_timestamp: now,
                };
            }
            SessionPhase::Active => {
                session.paused = false;
                session.last_activity_timestamp = now;
            }
            SessionPhase::Paused => session.paused = true,
            SessionPhase::Ended => {
                session.active = false;
                session.paused = false;
                session.end_time = Some(now);
            }
            SessionPhase::Idle => unreachable!("no transition leads back to idle"),
        }
        info!(session_id = %session.session_id, ?from, ?to, "session transition");
        true
    }

    /// Start a fresh session, returning its id. An active session is left
    /// alone and `None` is returned.
    pub fn start(&self, session: &mut Session, now: DateTime<Utc>) -> Option<String> {
        self.apply(session, SessionCommand::Start, now)
            .then(|| session.session_id.clone())
    }

    pub fn end(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        self.apply(session, SessionCommand::End, now)
    }

    /// Feed one raw score through the smoothing filter. Only running
    /// sessions are updated; returns the new smoothed score.
    pub fn update_focus_score(&self, session: &mut Session, raw: f64) -> Option<f64> {
        if !session.is_running() {
            return None;
        }
        session.focus_score = smooth(session.focus_score, raw);
        Some(session.focus_score)
    }

    /// Immediate deduction, used when landing on a listed distraction site.
    pub fn apply_penalty(&self, session: &mut Session, points: f64) -> Option<f64> {
        if !session.is_running() {
            return None;
        }
        session.focus_score = (session.focus_score - points.max(0.0)).clamp(0.0, 100.0);
        Some(session.focus_score)
    }

    pub fn record_distraction(&self, session: &mut Session) {
        if session.active {
            session.distraction_count += 1;
        }
    }

    pub fn record_focused_minute(&self, session: &mut Session) {
        if session.is_running() {
            session.focused_minutes += 1;
        }
    }

    /// Any activity refreshes the idle clock and wakes a paused session.
    pub fn touch_activity(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        if !session.active {
            return false;
        }
        session.last_activity_timestamp = now;
        self.apply(session, SessionCommand::Resume, now)
    }

    /// Pause an active session whose last activity is older than the idle
    /// threshold. Returns `true` if the session was paused by this call.
    pub fn check_idle(
        &self,
        session: &mut Session,
        last_activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        if session.phase() != SessionPhase::Active {
            return false;
        }
        if now - last_activity > self.idle_threshold {
            return self.apply(session, SessionCommand::Pause, now);
        }
        false
    }

    /// Reattach to a session persisted by a previous process.
    pub fn resume_after_restart(&self, session: &mut Session, now: DateTime<Utc>) -> bool {
        if session.active && session.start_time.is_some() {
            session.last_activity_timestamp = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn running_session(score: f64) -> Session {
        let mut s = Session::default();
        SessionManager::default().start(&mut s, Utc::now()).unwrap();
        s.focus_score = score;
        s
    }

    #[test]
    fn start_pause_resume_end() {
        let mgr = SessionManager::default();
        let now = Utc::now();
        let mut s = Session::default();
        assert_eq!(s.phase(), SessionPhase::Idle);

        let id = mgr.start(&mut s, now).unwrap();
        assert!(!id.is_empty());
        assert_eq!(s.phase(), SessionPhase::Active);
        assert_eq!(s.focus_score, 100.0);

        assert!(mgr.apply(&mut s, SessionCommand::Pause, now));
        assert_eq!(s.phase(), SessionPhase::Paused);
        assert!(s.paused && s.active);

        assert!(mgr.apply(&mut s, SessionCommand::Resume, now));
        assert_eq!(s.phase(), SessionPhase::Active);

        assert!(mgr.end(&mut s, now));
        assert_eq!(s.phase(), SessionPhase::Ended);
        assert!(!s.active && s.end_time.is_some());
    }

    #[test]
    fn disallowed_transitions_are_noops() {
        let mgr = SessionManager::default();
        let now = Utc::now();
        let mut s = Session::default();
        assert!(!mgr.end(&mut s, now));
        assert!(!mgr.apply(&mut s, SessionCommand::Pause, now));
        assert_eq!(s, {
            let mut d = Session::default();
            d.last_activity_timestamp = s.last_activity_timestamp;
            d
        });

        mgr.start(&mut s, now).unwrap();
        let id = s.session_id.clone();
        assert!(mgr.start(&mut s, now).is_none());
        assert_eq!(s.session_id, id);
    }

    #[test]
    fn restart_after_end_creates_new_session() {
        let mgr = SessionManager::default();
        let now = Utc::now();
        let mut s = Session::default();
        let first = mgr.start(&mut s, now).unwrap();
        s.distraction_count = 4;
        mgr.end(&mut s, now);
        let second = mgr.start(&mut s, now).unwrap();
        assert_ne!(first, second);
        assert_eq!(s.distraction_count, 0);
        assert!(s.end_time.is_none());
    }

    #[test]
    fn recovery_is_faster_than_decline() {
        assert!(smooth(50.0, 100.0) >= 97.5);
        assert!(smooth(50.0, 0.0) <= 20.0);
    }

    #[test]
    fn update_is_noop_unless_running() {
        let mgr = SessionManager::default();
        let mut s = running_session(80.0);
        mgr.apply(&mut s, SessionCommand::Pause, Utc::now());
        assert_eq!(mgr.update_focus_score(&mut s, 0.0), None);
        assert_eq!(s.focus_score, 80.0);
    }

    #[test]
    fn sustained_distraction_drops_below_forty() {
        let mgr = SessionManager::default();
        let mut s = running_session(80.0);
        for _ in 0..3 {
            mgr.update_focus_score(&mut s, 10.0);
        }
        assert!(s.focus_score < 40.0, "score was {}", s.focus_score);
    }

    #[test]
    fn idle_check_pauses_after_threshold() {
        let mgr = SessionManager::new(Duration::minutes(5));
        let now = Utc::now();
        let mut s = running_session(90.0);
        assert!(!mgr.check_idle(&mut s, now - Duration::minutes(4), now));
        assert!(mgr.check_idle(&mut s, now - Duration::minutes(6), now));
        assert_eq!(s.phase(), SessionPhase::Paused);
        // Activity wakes it again.
        assert!(mgr.touch_activity(&mut s, now));
        assert_eq!(s.phase(), SessionPhase::Active);
    }

    #[test]
    fn penalty_clamps_at_zero() {
        let mgr = SessionManager::default();
        let mut s = running_session(10.0);
        assert_eq!(mgr.apply_penalty(&mut s, 15.0), Some(0.0));
    }

    proptest! {
        #[test]
        fn smoothed_score_stays_in_bounds(
            start in 0.0f64..=100.0,
            raws in proptest::collection::vec(0.0f64..=100.0, 1..50),
        ) {
            let mgr = SessionManager::default();
            let mut s = running_session(start);
            for raw in raws {
                let next = mgr.update_focus_score(&mut s, raw).unwrap();
                prop_assert!((0.0..=100.0).contains(&next));
            }
        }

        #[test]
        fn out_of_range_raw_is_clamped(raw in -500.0f64..600.0) {
            let next = smooth(50.0, raw);
            prop_assert!((0.0..=100.0).contains(&next));
        }
    }
}
