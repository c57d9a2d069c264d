use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{BugField, IssueField, Session, TaskCategory};
use crate::report::{render_report, ExportFormat};
use crate::scheduler::{Job, Scheduler};
use crate::selector::AreaSelector;
use crate::storage::{write_report, SessionStore};
use crate::taxonomy::AreaNode;
use crate::tracker::{DurationTracker, TrackerState};
use crate::validation::{validate, ValidationReport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is read-only, enable editing first")]
    ReadOnly,
    #[error("bug #{0} does not exist")]
    UnknownBug(usize),
    #[error("issue #{0} does not exist")]
    UnknownIssue(usize),
    #[error("{0}")]
    Area(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("session is not ready for export:\n{}", .0.message())]
    Invalid(ValidationReport),
    #[error("error saving report: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the one live session and routes every user command through it.
/// Each accepted mutation restarts the debounced auto-save.
pub struct SessionController<S: SessionStore> {
    session: Session,
    selector: AreaSelector,
    tracker: DurationTracker,
    scheduler: Scheduler,
    store: S,
    opened_report: Option<PathBuf>,
    validation: ValidationReport,
    status: String,
}

impl<S: SessionStore> SessionController<S> {
    /// Restores the cached session if there is one, otherwise starts fresh.
    pub fn launch<Tz: TimeZone>(store: S, roots: Vec<AreaNode>, now: DateTime<Tz>) -> Self {
        let now_utc = now.with_timezone(&Utc);
        let cached = match store.load() {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "failed to load session cache, starting fresh");
                None
            }
        };

        let restored = cached.is_some();
        let session = cached.unwrap_or_else(|| Session::new(now));
        let tracker = DurationTracker::start(&session, now_utc);
        let mut scheduler = Scheduler::default();
        scheduler.start_ticking(now_utc);

        let mut controller = Self {
            session,
            selector: AreaSelector::new(roots),
            tracker,
            scheduler,
            store,
            opened_report: None,
            validation: ValidationReport::default(),
            status: String::new(),
        };
        controller.sync_areas_from_session();

        if restored {
            info!(title = %controller.session.title, "restored session from cache");
            controller.status = "Restored unsaved session".to_string();
        }
        controller
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn selector(&self) -> &AreaSelector {
        &self.selector
    }

    pub fn tracker(&self) -> &DurationTracker {
        &self.tracker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_read_only(&self) -> bool {
        self.tracker.state() == TrackerState::ReadOnly
    }

    pub fn opened_report(&self) -> Option<&Path> {
        self.opened_report.as_deref()
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn save_pending(&self) -> bool {
        self.scheduler.save_pending()
    }

    /// Single entry point for every edit: read-only gate, then the change,
    /// then the debounced save.
    fn edit<T>(
        &mut self,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly);
        }
        let outcome = change(&mut self.session)?;
        self.scheduler.schedule_save(now);
        Ok(outcome)
    }

    pub fn set_title(&mut self, title: String, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.title = title;
            Ok(())
        })
    }

    pub fn set_tester_names(&mut self, names: String, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.tester_names = names;
            Ok(())
        })
    }

    pub fn set_test_notes(&mut self, notes: String, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.test_notes = notes;
            Ok(())
        })
    }

    pub fn append_note_line(&mut self, line: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            if !session.test_notes.is_empty() {
                session.test_notes.push('\n');
            }
            session.test_notes.push_str(line);
            Ok(())
        })
    }

    pub fn set_task_percent(
        &mut self,
        category: TaskCategory,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.set_task_percent(category, value);
            Ok(())
        })
    }

    pub fn set_charter(&mut self, value: f64, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.set_charter(value);
            Ok(())
        })
    }

    pub fn set_opportunity(&mut self, value: f64, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session.set_opportunity(value);
            Ok(())
        })
    }

    pub fn select_area(
        &mut self,
        level: usize,
        option: usize,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly);
        }
        self.selector.select(level, option).map_err(SessionError::Area)?;
        let selections = self.selector.selections();
        self.edit(now, |session| {
            session.area_selections = selections;
            Ok(())
        })
    }

    pub fn attach_files<I>(&mut self, paths: I, now: DateTime<Utc>) -> Result<usize, SessionError>
    where
        I: IntoIterator<Item = String>,
    {
        self.edit(now, |session| Ok(session.attach_files(paths)))
    }

    pub fn remove_file(&mut self, path: &str, now: DateTime<Utc>) -> Result<bool, SessionError> {
        self.edit(now, |session| Ok(session.remove_file(path)))
    }

    pub fn add_bug(&mut self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        self.edit(now, |session| Ok(session.add_bug()))
    }

    pub fn set_bug_field(
        &mut self,
        index: usize,
        field: BugField,
        value: String,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.edit(now, |session| {
            let bug = session
                .bugs
                .get_mut(index)
                .ok_or(SessionError::UnknownBug(index + 1))?;
            bug.set_field(field, value);
            Ok(())
        })
    }

    pub fn toggle_bug_file(
        &mut self,
        index: usize,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.edit(now, |session| {
            let bug = session
                .bugs
                .get_mut(index)
                .ok_or(SessionError::UnknownBug(index + 1))?;
            Ok(bug.toggle_related_file(path))
        })
    }

    pub fn remove_bug(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session
                .remove_bug(index)
                .map(|_| ())
                .ok_or(SessionError::UnknownBug(index + 1))
        })
    }

    pub fn add_issue(&mut self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        self.edit(now, |session| Ok(session.add_issue()))
    }

    pub fn set_issue_field(
        &mut self,
        index: usize,
        field: IssueField,
        value: String,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.edit(now, |session| {
            let issue = session
                .issues
                .get_mut(index)
                .ok_or(SessionError::UnknownIssue(index + 1))?;
            issue.set_field(field, value);
            Ok(())
        })
    }

    pub fn remove_issue(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.edit(now, |session| {
            session
                .remove_issue(index)
                .map(|_| ())
                .ok_or(SessionError::UnknownIssue(index + 1))
        })
    }

    pub fn focus_gained(&mut self, now: DateTime<Utc>) {
        self.tracker.activate(now);
        if self.tracker.is_ticking() && !self.scheduler.is_ticking() {
            self.scheduler.start_ticking(now);
        }
    }

    /// Flushes elapsed time and saves immediately.
    pub fn focus_lost(&mut self, now: DateTime<Utc>) {
        if self.tracker.deactivate(&mut self.session, now) {
            self.scheduler.stop_ticking();
            self.save_now(now);
        }
    }

    /// Final flush on exit: counts the last stretch of active time and
    /// writes anything not yet saved.
    pub fn shutdown(&mut self, now: DateTime<Utc>) {
        let flushed = self.tracker.deactivate(&mut self.session, now);
        if flushed || self.scheduler.save_pending() {
            self.scheduler.cancel_save();
            self.save_now(now);
        }
    }

    /// Runs whatever timers are due at `now`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let jobs = self.scheduler.due(now);
        for job in &jobs {
            match job {
                Job::DurationTick => self.tracker.tick(&mut self.session, now),
                Job::AutoSave => self.save_now(now),
            }
        }
        jobs
    }

    /// Writes the cache right away. Failures are logged, never surfaced.
    pub fn save_now(&mut self, now: DateTime<Utc>) {
        self.session.last_active_timestamp = Some(now);
        match self.store.save(&self.session) {
            Ok(()) => debug!("session cache saved"),
            Err(err) => warn!(error = %err, "failed to save session cache"),
        }
    }

    pub fn run_validation(&mut self) -> &ValidationReport {
        self.validation = validate(&self.session);
        &self.validation
    }

    pub fn render(&mut self, format: ExportFormat, now: DateTime<Utc>) -> String {
        self.tracker.tick(&mut self.session, now);
        render_report(&self.session, self.session.accumulated_duration, format, now)
    }

    /// Validates, renders and writes the report into `dir`. On success the
    /// cache is cleared; on failure session and cache are left alone.
    pub fn export(
        &mut self,
        format: ExportFormat,
        dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ExportError> {
        self.tracker.tick(&mut self.session, now);
        if !self.run_validation().is_valid() {
            self.status = "Fix the listed problems before exporting".to_string();
            return Err(ExportError::Invalid(self.validation.clone()));
        }

        let report = render_report(&self.session, self.session.accumulated_duration, format, now);
        let written = write_report(
            dir,
            &self.session.title,
            format,
            &report,
            now.with_timezone(&Local),
        );

        match written {
            Ok(path) => {
                self.scheduler.cancel_save();
                if let Err(err) = self.store.clear() {
                    warn!(error = %err, "failed to clear session cache after export");
                }
                info!(path = %path.display(), ?format, "report exported");
                self.status = format!("Report saved to: {}", path.display());
                Ok(path)
            }
            Err(err) => {
                warn!(error = %err, "failed to write report");
                self.status = format!("Error saving report: {err}");
                Err(ExportError::Io(err))
            }
        }
    }

    /// Shows an imported report read-only. Its duration is frozen until
    /// editing is enabled again.
    pub fn open_report(&mut self, session: Session, path: &Path, now: DateTime<Utc>) {
        self.session = session;
        self.sync_areas_from_session();
        self.tracker.enter_read_only(&self.session);
        self.scheduler.stop_ticking();
        self.scheduler.schedule_save(now);
        self.validation = ValidationReport::default();

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(path = %path.display(), "opened report read-only");
        self.status = format!("Opened report: {name} (read-only)");
        self.opened_report = Some(path.to_path_buf());
    }

    pub fn enable_editing(&mut self, now: DateTime<Utc>) {
        if !self.is_read_only() {
            return;
        }
        self.tracker.enable_editing(now);
        self.scheduler.start_ticking(now);
        info!("editing enabled");
        self.status = "Editing enabled. Duration timer resumed.".to_string();
    }

    /// Drops the cache and starts over with a fresh session.
    pub fn clear<Tz: TimeZone>(&mut self, now: DateTime<Tz>) {
        let now_utc = now.with_timezone(&Utc);
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear session cache");
        }

        self.session = Session::new(now);
        self.selector.clear();
        self.tracker.reset(&self.session, now_utc);
        self.scheduler.cancel_save();
        self.scheduler.start_ticking(now_utc);
        self.opened_report = None;
        self.validation = ValidationReport::default();
        info!("session cleared");
        self.status = "Session cleared".to_string();
    }

    /// Area names that no longer resolve in the taxonomy are dropped.
    fn sync_areas_from_session(&mut self) {
        self.selector.restore(&self.session.area_selections);
        self.session.area_selections = self.selector.selections();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{ExportError, SessionController, SessionError};
    use crate::domain::{BugField, IssueField, Session, TaskCategory};
    use crate::report::ExportFormat;
    use crate::scheduler::Job;
    use crate::storage::{CacheFile, SessionStore, StorageError};
    use crate::taxonomy::parse_taxonomy;

    #[derive(Default)]
    struct MemoryStore {
        cached: Option<Session>,
        saves: usize,
        clears: usize,
        fail_saves: bool,
    }

    impl SessionStore for MemoryStore {
        fn save(&mut self, session: &Session) -> Result<(), StorageError> {
            if self.fail_saves {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.saves += 1;
            self.cached = Some(session.clone());
            Ok(())
        }

        fn load(&self) -> Result<Option<Session>, StorageError> {
            Ok(self.cached.clone())
        }

        fn clear(&mut self) -> Result<(), StorageError> {
            self.clears += 1;
            self.cached = None;
            Ok(())
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn at_millis(millis: i64) -> DateTime<Utc> {
        at(0) + Duration::milliseconds(millis)
    }

    fn controller() -> SessionController<MemoryStore> {
        SessionController::launch(
            MemoryStore::default(),
            parse_taxonomy("Web|Auth|Login\nWeb|Profile\nAPI|REST"),
            at(0),
        )
    }

    fn fill_valid(controller: &mut SessionController<MemoryStore>, now: DateTime<Utc>) {
        controller.set_title("Checkout".to_string(), now).unwrap();
        controller.select_area(0, 0, now).unwrap();
        controller.set_tester_names("Ana".to_string(), now).unwrap();
        controller.set_task_percent(TaskCategory::SessionSetup, 20.0, now).unwrap();
        controller.set_task_percent(TaskCategory::TestDesignExecution, 60.0, now).unwrap();
        controller.set_task_percent(TaskCategory::BugInvestigation, 20.0, now).unwrap();
        controller.set_charter(70.0, now).unwrap();
        controller.set_test_notes("notes".to_string(), now).unwrap();
    }

    #[test]
    fn burst_of_mutations_saves_once() {
        let mut controller = controller();
        for step in 0..8 {
            let now = at_millis(step * 500);
            controller.set_title(format!("title {step}"), now).unwrap();
            controller.poll(now);
        }
        assert_eq!(controller.store().saves, 0);

        let last = 7 * 500;
        controller.poll(at_millis(last + 1900));
        assert_eq!(controller.store().saves, 0);
        let jobs = controller.poll(at_millis(last + 2000));
        assert!(jobs.contains(&Job::AutoSave));
        assert_eq!(controller.store().saves, 1);
        controller.poll(at_millis(last + 6000));
        assert_eq!(controller.store().saves, 1);
        assert_eq!(
            controller.store().cached.as_ref().map(|s| s.title.as_str()),
            Some("title 7")
        );
    }

    #[test]
    fn ticks_accumulate_through_poll() {
        let mut controller = controller();
        for second in 1..=5 {
            controller.poll(at(second));
        }
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(5));
        assert_eq!(controller.tracker().display(), "5s");
    }

    #[test]
    fn focus_loss_flushes_and_saves_immediately() {
        let mut controller = controller();
        controller.poll(at(1));
        controller.focus_lost(at(3));
        assert_eq!(controller.store().saves, 1);
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(3));
        assert_eq!(controller.session().last_active_timestamp, Some(at(3)));

        controller.poll(at(100));
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(3));

        controller.focus_gained(at(200));
        controller.poll(at(201));
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(4));
    }

    #[test]
    fn shutdown_writes_pending_work_once() {
        let mut controller = controller();
        controller.set_title("late edit".to_string(), at(1)).unwrap();
        controller.shutdown(at(2));
        assert_eq!(controller.store().saves, 1);
        assert!(!controller.save_pending());
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(2));

        controller.shutdown(at(3));
        assert_eq!(controller.store().saves, 1);
    }

    #[test]
    fn area_selection_updates_session() {
        let mut controller = controller();
        controller.select_area(0, 0, at(0)).unwrap();
        controller.select_area(1, 0, at(0)).unwrap();
        controller.select_area(2, 0, at(0)).unwrap();
        assert_eq!(controller.session().area_selections, vec!["Web", "Auth", "Login"]);

        controller.select_area(1, 1, at(0)).unwrap();
        assert_eq!(controller.session().area_selections, vec!["Web", "Profile"]);
        assert!(matches!(controller.select_area(5, 0, at(0)), Err(SessionError::Area(_))));
    }

    #[test]
    fn restores_cached_session_on_launch() {
        let cached = Session {
            title: "Crashed".to_string(),
            area_selections: vec!["Web".to_string(), "Auth".to_string()],
            accumulated_duration: Duration::seconds(42),
            ..Session::default()
        };
        let store = MemoryStore {
            cached: Some(cached),
            ..MemoryStore::default()
        };
        let controller = SessionController::launch(store, parse_taxonomy("Web|Auth|Login"), at(0));
        assert_eq!(controller.session().title, "Crashed");
        assert_eq!(controller.selector().levels().len(), 3);
        assert_eq!(controller.tracker().display(), "42s");
        assert!(!controller.is_read_only());
    }

    #[test]
    fn read_only_rejects_edits_until_enabled() {
        let mut controller = controller();
        let report = Session {
            title: "Imported".to_string(),
            accumulated_duration: Duration::seconds(5025),
            ..Session::default()
        };
        controller.open_report(report, std::path::Path::new("/tmp/r.json"), at(10));
        assert!(controller.is_read_only());
        assert_eq!(controller.status(), "Opened report: r.json (read-only)");
        assert!(matches!(
            controller.set_title("x".to_string(), at(11)),
            Err(SessionError::ReadOnly)
        ));
        assert!(matches!(controller.select_area(0, 0, at(11)), Err(SessionError::ReadOnly)));

        controller.poll(at(20));
        controller.focus_lost(at(25));
        controller.focus_gained(at(30));
        controller.poll(at(40));
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(5025));

        controller.enable_editing(at(50));
        controller.poll(at(52));
        assert_eq!(controller.session().accumulated_duration, Duration::seconds(5027));
        controller.set_title("edited".to_string(), at(53)).unwrap();
    }

    #[test]
    fn export_blocked_by_validation() {
        let mut controller = controller();
        let dir = tempfile::tempdir().expect("temp dir");
        let result = controller.export(ExportFormat::PlainText, dir.path(), at(1));
        let Err(ExportError::Invalid(report)) = result else {
            panic!("expected validation failure");
        };
        assert!(report.violations.len() >= 5);
        assert_eq!(controller.validation(), &report);
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
    }

    #[test]
    fn successful_export_clears_cache() {
        let mut controller = controller();
        fill_valid(&mut controller, at(0));
        controller.save_now(at(1));
        assert!(controller.store().cached.is_some());
        assert!(controller.save_pending());

        let dir = tempfile::tempdir().expect("temp dir");
        let path = controller
            .export(ExportFormat::Json, dir.path(), at(90))
            .expect("export");
        let content = std::fs::read_to_string(&path).expect("read report");
        assert!(content.contains("\"duration\": \"1m 30s\""));
        assert!(controller.store().cached.is_none());
        assert!(!controller.save_pending());
        assert!(controller.status().starts_with("Report saved to: "));
        assert_eq!(controller.session().title, "Checkout");
    }

    #[test]
    fn export_io_failure_leaves_state() {
        let mut controller = controller();
        fill_valid(&mut controller, at(0));
        controller.save_now(at(1));

        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").expect("write");
        let result = controller.export(ExportFormat::Markdown, &blocker, at(2));
        assert!(matches!(result, Err(ExportError::Io(_))));
        assert!(controller.store().cached.is_some());
        assert!(controller.status().starts_with("Error saving report: "));
    }

    #[test]
    fn save_failures_are_swallowed() {
        let store = MemoryStore {
            fail_saves: true,
            ..MemoryStore::default()
        };
        let mut controller = SessionController::launch(store, parse_taxonomy("A"), at(0));
        controller.set_title("t".to_string(), at(0)).unwrap();
        controller.poll(at(3));
        assert_eq!(controller.store().saves, 0);
        assert_eq!(controller.session().title, "t");
    }

    #[test]
    fn clear_resets_everything() {
        let mut controller = controller();
        fill_valid(&mut controller, at(0));
        controller.add_bug(at(0)).unwrap();
        controller.poll(at(5));
        controller.clear(at(10));

        assert_eq!(controller.store().clears, 1);
        assert!(controller.store().cached.is_none());
        assert!(!controller.save_pending());
        assert_eq!(controller.session(), &Session::new(at(10)));
        assert_eq!(controller.selector().levels().len(), 1);
        assert_eq!(controller.tracker().display(), "0s");
    }

    #[test]
    fn bug_and_issue_commands() {
        let mut controller = controller();
        controller
            .attach_files(vec!["/a".to_string(), "/b".to_string(), "/a".to_string()], at(0))
            .unwrap();
        let bug = controller.add_bug(at(0)).unwrap();
        controller
            .set_bug_field(bug, BugField::Title, "t".to_string(), at(0))
            .unwrap();
        assert!(controller.toggle_bug_file(bug, "/b", at(0)).unwrap());
        assert!(controller.remove_file("/b", at(0)).unwrap());
        assert_eq!(controller.session().bugs[0].related_files, vec!["/b"]);
        assert!(matches!(
            controller.set_bug_field(3, BugField::Result, "r".to_string(), at(0)),
            Err(SessionError::UnknownBug(4))
        ));

        let issue = controller.add_issue(at(0)).unwrap();
        controller
            .set_issue_field(issue, IssueField::Description, "d".to_string(), at(0))
            .unwrap();
        controller.remove_issue(issue, at(0)).unwrap();
        assert!(controller.remove_issue(0, at(0)).is_err());
        controller.remove_bug(bug, at(0)).unwrap();
        assert!(controller.session().bugs.is_empty());
    }

    #[test]
    fn works_against_cache_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut controller =
            SessionController::launch(CacheFile::in_dir(dir.path()), parse_taxonomy("A|B"), at(0));
        controller.set_title("persisted".to_string(), at(0)).unwrap();
        controller.append_note_line("first", at(0)).unwrap();
        controller.append_note_line("second", at(0)).unwrap();
        controller.poll(at(2));

        let relaunched =
            SessionController::launch(CacheFile::in_dir(dir.path()), parse_taxonomy("A|B"), at(60));
        assert_eq!(relaunched.session().title, "persisted");
        assert_eq!(relaunched.session().test_notes, "first\nsecond");
    }
}
