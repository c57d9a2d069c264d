use chrono::{DateTime, Duration, Utc};

pub const TICK_PERIOD_SECONDS: i64 = 1;
pub const SAVE_DEBOUNCE_SECONDS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    DurationTick,
    AutoSave,
}

/// Single-threaded timer bookkeeping driven by an explicit clock. The event
/// loop calls [`Scheduler::due`] with the current time; nothing here sleeps.
#[derive(Debug, Clone)]
pub struct Scheduler {
    tick_period: Duration,
    next_tick: Option<DateTime<Utc>>,
    save_debounce: Duration,
    save_deadline: Option<DateTime<Utc>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(
            Duration::seconds(TICK_PERIOD_SECONDS),
            Duration::seconds(SAVE_DEBOUNCE_SECONDS),
        )
    }
}

impl Scheduler {
    pub fn new(tick_period: Duration, save_debounce: Duration) -> Self {
        Self {
            tick_period,
            next_tick: None,
            save_debounce,
            save_deadline: None,
        }
    }

    pub fn start_ticking(&mut self, now: DateTime<Utc>) {
        self.next_tick = Some(now + self.tick_period);
    }

    pub fn stop_ticking(&mut self) {
        self.next_tick = None;
    }

    pub fn is_ticking(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Restarts the save countdown. Bursts of calls collapse into one save.
    pub fn schedule_save(&mut self, now: DateTime<Utc>) {
        self.save_deadline = Some(now + self.save_debounce);
    }

    pub fn cancel_save(&mut self) {
        self.save_deadline = None;
    }

    pub fn save_pending(&self) -> bool {
        self.save_deadline.is_some()
    }

    /// Jobs whose time has come. A late tick fires once, not once per
    /// missed period.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = Vec::new();

        if let Some(next_tick) = self.next_tick {
            if now >= next_tick {
                jobs.push(Job::DurationTick);
                self.next_tick = Some(now + self.tick_period);
            }
        }

        if let Some(deadline) = self.save_deadline {
            if now >= deadline {
                jobs.push(Job::AutoSave);
                self.save_deadline = None;
            }
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{Job, Scheduler};

    fn at_millis(millis: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + Duration::milliseconds(millis)
    }

    #[test]
    fn burst_of_edits_yields_one_save() {
        let mut scheduler = Scheduler::default();
        let mut saves = 0;
        for edit in 0..10 {
            scheduler.schedule_save(at_millis(edit * 1500));
            saves += scheduler
                .due(at_millis(edit * 1500 + 100))
                .iter()
                .filter(|job| **job == Job::AutoSave)
                .count();
        }
        assert_eq!(saves, 0);

        let last_edit = 9 * 1500;
        assert!(scheduler.due(at_millis(last_edit + 1999)).is_empty());
        assert_eq!(scheduler.due(at_millis(last_edit + 2000)), vec![Job::AutoSave]);
        assert!(scheduler.due(at_millis(last_edit + 10_000)).is_empty());
    }

    #[test]
    fn tick_fires_every_period_while_running() {
        let mut scheduler = Scheduler::default();
        assert!(scheduler.due(at_millis(5000)).is_empty());

        scheduler.start_ticking(at_millis(0));
        assert!(scheduler.due(at_millis(999)).is_empty());
        assert_eq!(scheduler.due(at_millis(1000)), vec![Job::DurationTick]);
        assert!(scheduler.due(at_millis(1500)).is_empty());
        assert_eq!(scheduler.due(at_millis(7000)), vec![Job::DurationTick]);

        scheduler.stop_ticking();
        assert!(scheduler.due(at_millis(60_000)).is_empty());
    }

    #[test]
    fn cancelled_save_never_fires() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule_save(at_millis(0));
        assert!(scheduler.save_pending());
        scheduler.cancel_save();
        assert!(scheduler.due(at_millis(10_000)).is_empty());
    }
}
