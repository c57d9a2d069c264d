use chrono::{DateTime, Duration, Utc};

use crate::domain::{format_duration, DurationCategory, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Active,
    Inactive,
    ReadOnly,
}

/// Accumulates active wall time into the session. Time only counts while
/// the tracker is `Active`; read-only freezes the total until editing is
/// re-enabled.
#[derive(Debug, Clone)]
pub struct DurationTracker {
    state: TrackerState,
    last_active: DateTime<Utc>,
    display: String,
    category: DurationCategory,
}

impl DurationTracker {
    pub fn start(session: &Session, now: DateTime<Utc>) -> Self {
        let mut tracker = Self {
            state: TrackerState::Active,
            last_active: now,
            display: String::new(),
            category: DurationCategory::Small,
        };
        tracker.refresh_readout(session);
        tracker
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_ticking(&self) -> bool {
        self.state == TrackerState::Active
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn category(&self) -> DurationCategory {
        self.category
    }

    /// Periodic tick. No-op unless active.
    pub fn tick(&mut self, session: &mut Session, now: DateTime<Utc>) {
        if self.state != TrackerState::Active {
            return;
        }
        self.flush(session, now);
        self.refresh_readout(session);
    }

    /// App lost focus. Returns true when time was flushed and the session
    /// should be saved right away.
    pub fn deactivate(&mut self, session: &mut Session, now: DateTime<Utc>) -> bool {
        if self.state != TrackerState::Active {
            return false;
        }
        self.flush(session, now);
        self.refresh_readout(session);
        self.state = TrackerState::Inactive;
        true
    }

    /// App gained focus. Ignored while read-only.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        if self.state == TrackerState::Inactive {
            self.state = TrackerState::Active;
            self.last_active = now;
        }
    }

    pub fn enter_read_only(&mut self, session: &Session) {
        self.state = TrackerState::ReadOnly;
        self.refresh_readout(session);
    }

    /// Leaves read-only and resumes counting on top of the carried-over total.
    pub fn enable_editing(&mut self, now: DateTime<Utc>) {
        if self.state == TrackerState::ReadOnly {
            self.state = TrackerState::Active;
            self.last_active = now;
        }
    }

    /// Back to a fresh active state, e.g. after the session was cleared.
    pub fn reset(&mut self, session: &Session, now: DateTime<Utc>) {
        self.state = TrackerState::Active;
        self.last_active = now;
        self.refresh_readout(session);
    }

    fn flush(&mut self, session: &mut Session, now: DateTime<Utc>) {
        let elapsed = now - self.last_active;
        if elapsed > Duration::zero() {
            session.accumulated_duration += elapsed;
        }
        self.last_active = now;
    }

    fn refresh_readout(&mut self, session: &Session) {
        self.display = format_duration(session.accumulated_duration);
        self.category = DurationCategory::for_duration(session.accumulated_duration);
    }
}
