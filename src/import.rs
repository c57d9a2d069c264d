use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{parse_duration, BugEntry, IssueEntry, Session, TaskCategory};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("report is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report JSON must be an object at the top level")]
    NotAnObject,
}

/// Rebuilds a session from an exported JSON report. Missing or mistyped
/// fields fall back to empty values; only unparseable JSON is an error.
/// The footer timestamp is ignored.
pub fn import_report(json: &str) -> Result<Session, ImportError> {
    let value: Value = serde_json::from_str(json)?;
    let root = value.as_object().ok_or(ImportError::NotAnObject)?;

    let mut session = Session {
        title: string_field(root, "title"),
        area_selections: string_list(root, "areas"),
        start_time_display: string_field(root, "start"),
        accumulated_duration: parse_duration(&string_field(root, "duration")),
        tester_names: string_field(root, "testers"),
        attached_files: string_list(root, "attachedFiles"),
        test_notes: string_field(root, "testNotes"),
        ..Session::default()
    };

    // Charter wins over opportunity; a report with neither keeps both at 0.
    if let Some(charter) = optional_number(root, "charter") {
        session.set_charter(charter);
    } else if let Some(opportunity) = optional_number(root, "opportunity") {
        session.set_opportunity(opportunity);
    }

    if let Some(breakdown) = root.get("taskBreakdown").and_then(Value::as_object) {
        for (category, key) in [
            (TaskCategory::SessionSetup, "sessionSetup"),
            (TaskCategory::TestDesignExecution, "testDesignExecution"),
            (TaskCategory::BugInvestigation, "bugInvestigationReporting"),
        ] {
            session.set_task_percent(category, optional_number(breakdown, key).unwrap_or(0.0));
        }
    }

    session.bugs = objects(root, "bugs")
        .map(|bug| BugEntry {
            title: string_field(bug, "title"),
            description: string_field(bug, "description"),
            result: string_field(bug, "result"),
            expected_result: string_field(bug, "expectedResult"),
            related_files: string_list(bug, "relatedFiles"),
        })
        .collect();

    session.issues = objects(root, "issues")
        .map(|issue| IssueEntry {
            title: string_field(issue, "title"),
            description: string_field(issue, "description"),
        })
        .collect();

    Ok(session)
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_number(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn objects<'a>(
    object: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    object
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}
