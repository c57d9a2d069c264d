use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const PERCENT_SUM_MIN: f64 = 99.9;
pub const PERCENT_SUM_MAX: f64 = 100.1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BugEntry {
    pub title: String,
    pub description: String,
    pub result: String,
    pub expected_result: String,
    pub related_files: Vec<String>,
}

impl BugEntry {
    pub fn field(&self, field: BugField) -> &str {
        match field {
            BugField::Title => &self.title,
            BugField::Description => &self.description,
            BugField::Result => &self.result,
            BugField::ExpectedResult => &self.expected_result,
        }
    }

    pub fn set_field(&mut self, field: BugField, value: String) {
        match field {
            BugField::Title => self.title = value,
            BugField::Description => self.description = value,
            BugField::Result => self.result = value,
            BugField::ExpectedResult => self.expected_result = value,
        }
    }

    /// Adds the path if absent, removes it otherwise. Returns whether the
    /// file is related after the call.
    pub fn toggle_related_file(&mut self, path: &str) -> bool {
        if let Some(index) = self.related_files.iter().position(|file| file == path) {
            self.related_files.remove(index);
            false
        } else {
            self.related_files.push(path.to_string());
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugField {
    Title,
    Description,
    Result,
    ExpectedResult,
}

impl BugField {
    pub const ALL: [BugField; 4] = [
        BugField::Title,
        BugField::Description,
        BugField::Result,
        BugField::ExpectedResult,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BugField::Title => "Title",
            BugField::Description => "Description",
            BugField::Result => "Result",
            BugField::ExpectedResult => "Expected Result",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueEntry {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueField {
    Title,
    Description,
}

impl IssueField {
    pub const ALL: [IssueField; 2] = [IssueField::Title, IssueField::Description];

    pub fn label(self) -> &'static str {
        match self {
            IssueField::Title => "Title",
            IssueField::Description => "Description",
        }
    }
}

impl IssueEntry {
    pub fn field(&self, field: IssueField) -> &str {
        match field {
            IssueField::Title => &self.title,
            IssueField::Description => &self.description,
        }
    }

    pub fn set_field(&mut self, field: IssueField, value: String) {
        match field {
            IssueField::Title => self.title = value,
            IssueField::Description => self.description = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    SessionSetup,
    TestDesignExecution,
    BugInvestigation,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 3] = [
        TaskCategory::SessionSetup,
        TaskCategory::TestDesignExecution,
        TaskCategory::BugInvestigation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskCategory::SessionSetup => "Session Setup",
            TaskCategory::TestDesignExecution => "Test Design & Execution",
            TaskCategory::BugInvestigation => "Bug Investigation & Reporting",
        }
    }
}

/// The live testing session. Serialized as-is into the crash-recovery cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub title: String,
    pub area_selections: Vec<String>,
    pub start_time_display: String,
    pub start_time_utc: DateTime<Utc>,
    #[serde(rename = "accumulatedDurationMs", with = "duration_millis")]
    pub accumulated_duration: Duration,
    pub last_active_timestamp: Option<DateTime<Utc>>,
    pub tester_names: String,
    pub session_setup: f64,
    pub test_design_execution: f64,
    pub bug_investigation: f64,
    pub charter_percent: f64,
    pub opportunity_percent: f64,
    pub attached_files: Vec<String>,
    pub test_notes: String,
    pub bugs: Vec<BugEntry>,
    pub issues: Vec<IssueEntry>,
}

impl Session {
    /// A fresh session started at `now`, displayed in the given offset.
    pub fn new<Tz: TimeZone>(now: DateTime<Tz>) -> Self {
        Self {
            start_time_display: format_start_time(&now),
            start_time_utc: now.with_timezone(&Utc),
            ..Self::default()
        }
    }

    pub fn task_percent(&self, category: TaskCategory) -> f64 {
        match category {
            TaskCategory::SessionSetup => self.session_setup,
            TaskCategory::TestDesignExecution => self.test_design_execution,
            TaskCategory::BugInvestigation => self.bug_investigation,
        }
    }

    pub fn set_task_percent(&mut self, category: TaskCategory, value: f64) {
        let value = normalize_percent(value);
        match category {
            TaskCategory::SessionSetup => self.session_setup = value,
            TaskCategory::TestDesignExecution => self.test_design_execution = value,
            TaskCategory::BugInvestigation => self.bug_investigation = value,
        }
    }

    pub fn task_breakdown_sum(&self) -> f64 {
        self.session_setup + self.test_design_execution + self.bug_investigation
    }

    /// Live feedback for the task breakdown; empty when the sum is in band.
    pub fn task_breakdown_error(&self) -> String {
        let sum = self.task_breakdown_sum();
        if percent_sum_in_band(sum) {
            String::new()
        } else {
            format!("Sum is {sum:.1}%. Must equal 100% (current: {sum:.1}%)")
        }
    }

    /// Sets charter and derives opportunity in the same step.
    pub fn set_charter(&mut self, value: f64) {
        self.charter_percent = normalize_percent(value);
        self.opportunity_percent = round_one_decimal(100.0 - self.charter_percent);
    }

    /// Sets opportunity and derives charter in the same step.
    pub fn set_opportunity(&mut self, value: f64) {
        self.opportunity_percent = normalize_percent(value);
        self.charter_percent = round_one_decimal(100.0 - self.opportunity_percent);
    }

    /// Appends paths not already attached, keeping insertion order. Returns
    /// the number of newly attached files.
    pub fn attach_files<I, S>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for path in paths {
            let path = path.into();
            if !self.attached_files.contains(&path) {
                self.attached_files.push(path);
                added += 1;
            }
        }
        added
    }

    /// Bugs keep their `related_files` entries for the removed path.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let before = self.attached_files.len();
        self.attached_files.retain(|file| file != path);
        self.attached_files.len() != before
    }

    pub fn add_bug(&mut self) -> usize {
        self.bugs.push(BugEntry::default());
        self.bugs.len() - 1
    }

    pub fn remove_bug(&mut self, index: usize) -> Option<BugEntry> {
        (index < self.bugs.len()).then(|| self.bugs.remove(index))
    }

    pub fn add_issue(&mut self) -> usize {
        self.issues.push(IssueEntry::default());
        self.issues.len() - 1
    }

    pub fn remove_issue(&mut self, index: usize) -> Option<IssueEntry> {
        (index < self.issues.len()).then(|| self.issues.remove(index))
    }

    pub fn area_path(&self) -> String {
        self.area_selections.join(" > ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationCategory {
    Small,
    Medium,
    Long,
}

impl DurationCategory {
    /// Boundaries belong to the lower category.
    pub fn for_duration(duration: Duration) -> Self {
        let seconds = duration.num_seconds();
        if seconds <= 3600 {
            DurationCategory::Small
        } else if seconds <= 4 * 3600 {
            DurationCategory::Medium
        } else {
            DurationCategory::Long
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DurationCategory::Small => "SMALL",
            DurationCategory::Medium => "MEDIUM",
            DurationCategory::Long => "LONG",
        }
    }
}

impl Display for DurationCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours >= 1 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if total_seconds >= 60 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Inverse of [`format_duration`]. Reads `h`, `m` and `s` suffixed tokens
/// in any order; a repeated unit keeps the last value. Anything missing,
/// unreadable or out of range counts as zero.
pub fn parse_duration(formatted: &str) -> Duration {
    let mut hours = Duration::zero();
    let mut minutes = Duration::zero();
    let mut seconds = Duration::zero();

    for token in formatted.split_whitespace() {
        if let Some(raw) = token.strip_suffix('h') {
            hours = parse_unit(raw, Duration::try_hours);
        } else if let Some(raw) = token.strip_suffix('m') {
            minutes = parse_unit(raw, Duration::try_minutes);
        } else if let Some(raw) = token.strip_suffix('s') {
            seconds = parse_unit(raw, Duration::try_seconds);
        }
    }

    hours
        .checked_add(&minutes)
        .and_then(|total| total.checked_add(&seconds))
        .unwrap_or_else(Duration::zero)
}

fn parse_unit(raw: &str, unit: fn(i64) -> Option<Duration>) -> Duration {
    raw.parse()
        .ok()
        .and_then(unit)
        .unwrap_or_else(Duration::zero)
}

/// `dd/MM/yyyy hh:mm AM UTC+2`; the offset is truncated to whole hours.
pub fn format_start_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    let offset: FixedOffset = now.offset().fix();
    let offset_hours = offset.local_minus_utc() / 3600;
    let offset_label = match offset_hours {
        0 => "UTC".to_string(),
        hours if hours > 0 => format!("UTC+{hours}"),
        hours => format!("UTC{hours}"),
    };
    let local = now.with_timezone(&offset);
    format!("{} {offset_label}", local.format("%d/%m/%Y %I:%M %p"))
}

/// Sums are compared at one decimal so 33.3 * 3 lands on 99.9, not just
/// below it.
pub fn percent_sum_in_band(sum: f64) -> bool {
    (PERCENT_SUM_MIN..=PERCENT_SUM_MAX).contains(&round_one_decimal(sum))
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

fn normalize_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    round_one_decimal(value.clamp(0.0, 100.0))
}

mod duration_millis {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Duration::try_milliseconds(millis)
            .ok_or_else(|| D::Error::custom(format!("duration of {millis} ms is out of range")))
    }
}
