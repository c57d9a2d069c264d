use crate::domain::{percent_sum_in_band, Session};

/// Outcome of checking a session before export. Every rule is evaluated;
/// nothing short-circuits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn message(&self) -> String {
        self.violations.join("\n")
    }
}

pub fn validate(session: &Session) -> ValidationReport {
    let mut violations = Vec::new();

    if is_blank(&session.title) {
        violations.push("Title is required.".to_string());
    }

    if session.area_selections.is_empty() {
        violations.push("At least one area must be selected.".to_string());
    }

    if is_blank(&session.tester_names) {
        violations.push("Tester name(s) required.".to_string());
    }

    let task_sum = session.task_breakdown_sum();
    if !percent_sum_in_band(task_sum) {
        violations.push(format!(
            "Task breakdown must sum to 100% (currently {task_sum:.1}%)."
        ));
    }

    let charter_sum = session.charter_percent + session.opportunity_percent;
    if !percent_sum_in_band(charter_sum) {
        violations.push(format!(
            "Charter + Opportunity must sum to 100% (currently {charter_sum:.1}%)."
        ));
    }

    if is_blank(&session.test_notes) {
        violations.push("Test notes are required.".to_string());
    }

    for (index, bug) in session.bugs.iter().enumerate() {
        let number = index + 1;
        let fields = [
            (&bug.title, "Title"),
            (&bug.description, "Description"),
            (&bug.result, "Result"),
            (&bug.expected_result, "Expected Result"),
        ];
        for (value, label) in fields {
            if is_blank(value) {
                violations.push(format!("Bug #{number}: {label} is required."));
            }
        }
    }

    for (index, issue) in session.issues.iter().enumerate() {
        let number = index + 1;
        if is_blank(&issue.title) {
            violations.push(format!("Issue #{number}: Title is required."));
        }
        if is_blank(&issue.description) {
            violations.push(format!("Issue #{number}: Description is required."));
        }
    }

    ValidationReport { violations }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::domain::{BugEntry, IssueEntry, Session, TaskCategory};

    fn valid_session() -> Session {
        let mut session = Session {
            title: "Checkout flow".to_string(),
            area_selections: vec!["Web".to_string()],
            tester_names: "Ana".to_string(),
            test_notes: "Explored coupons.".to_string(),
            ..Session::default()
        };
        session.set_task_percent(TaskCategory::SessionSetup, 10.0);
        session.set_task_percent(TaskCategory::TestDesignExecution, 70.0);
        session.set_task_percent(TaskCategory::BugInvestigation, 20.0);
        session.set_charter(80.0);
        session
    }

    fn with_breakdown(a: f64, b: f64, c: f64) -> Session {
        let mut session = valid_session();
        session.set_task_percent(TaskCategory::SessionSetup, a);
        session.set_task_percent(TaskCategory::TestDesignExecution, b);
        session.set_task_percent(TaskCategory::BugInvestigation, c);
        session
    }

    #[test]
    fn valid_session_passes() {
        let report = validate(&valid_session());
        assert!(report.is_valid(), "{}", report.message());
        assert_eq!(report.message(), "");
    }

    #[test]
    fn breakdown_tolerance_band() {
        assert!(validate(&with_breakdown(33.3, 33.3, 33.4)).is_valid());
        assert!(validate(&with_breakdown(33.3, 33.3, 33.3)).is_valid());

        let report = validate(&with_breakdown(33.3, 33.3, 33.2));
        assert_eq!(
            report.violations,
            vec!["Task breakdown must sum to 100% (currently 99.8%).".to_string()]
        );
    }

    #[test]
    fn fresh_charter_and_opportunity_fail() {
        let mut session = valid_session();
        session.charter_percent = 0.0;
        session.opportunity_percent = 0.0;
        let report = validate(&session);
        assert_eq!(
            report.violations,
            vec!["Charter + Opportunity must sum to 100% (currently 0.0%).".to_string()]
        );
    }

    #[test]
    fn accumulates_every_violation() {
        let mut session = valid_session();
        session.title = "   ".to_string();
        session.test_notes.clear();
        session.bugs.push(BugEntry {
            description: "d".to_string(),
            result: "r".to_string(),
            expected_result: "e".to_string(),
            ..BugEntry::default()
        });

        let report = validate(&session);
        assert!(!report.is_valid());
        assert_eq!(
            report.violations,
            vec![
                "Title is required.".to_string(),
                "Test notes are required.".to_string(),
                "Bug #1: Title is required.".to_string(),
            ]
        );
        assert_eq!(report.message().lines().count(), 3);
    }

    #[test]
    fn numbers_entries_by_position() {
        let mut session = valid_session();
        session.bugs.push(BugEntry {
            title: "t".to_string(),
            description: "d".to_string(),
            result: "r".to_string(),
            expected_result: "e".to_string(),
            related_files: Vec::new(),
        });
        session.bugs.push(BugEntry::default());
        session.issues.push(IssueEntry {
            title: "ok".to_string(),
            description: String::new(),
        });

        let report = validate(&session);
        assert_eq!(
            report.violations,
            vec![
                "Bug #2: Title is required.".to_string(),
                "Bug #2: Description is required.".to_string(),
                "Bug #2: Result is required.".to_string(),
                "Bug #2: Expected Result is required.".to_string(),
                "Issue #1: Description is required.".to_string(),
            ]
        );
    }

    #[test]
    fn missing_areas_and_testers_are_reported() {
        let mut session = valid_session();
        session.area_selections.clear();
        session.tester_names = "\t".to_string();
        let report = validate(&session);
        assert_eq!(
            report.violations,
            vec![
                "At least one area must be selected.".to_string(),
                "Tester name(s) required.".to_string(),
            ]
        );
    }
}
