use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{format_duration, DurationCategory, Session};

const RULE_WIDTH: usize = 60;
const BLOCK_INDENT: &str = "                     ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    PlainText,
    Markdown,
    Html,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::PlainText,
        ExportFormat::Markdown,
        ExportFormat::Html,
        ExportFormat::Json,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::PlainText => ".txt",
            ExportFormat::Markdown => ".md",
            ExportFormat::Html => ".html",
            ExportFormat::Json => ".json",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ExportFormat::PlainText => "Plain Text (.txt)",
            ExportFormat::Markdown => "Markdown (.md)",
            ExportFormat::Html => "HTML (.html)",
            ExportFormat::Json => "JSON (.json)",
        }
    }
}

/// Renders the session as a report. `generated_at` only feeds the footer.
pub fn render_report(
    session: &Session,
    active_duration: Duration,
    format: ExportFormat,
    generated_at: DateTime<Utc>,
) -> String {
    let generated = format!("{} UTC", generated_at.format("%Y-%m-%d %H:%M:%S"));
    match format {
        ExportFormat::PlainText => render_plain_text(session, active_duration, &generated),
        ExportFormat::Markdown => render_markdown(session, active_duration, &generated),
        ExportFormat::Html => render_html(session, active_duration, &generated),
        ExportFormat::Json => render_json(session, active_duration, &generated),
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn duration_with_category(duration: Duration) -> String {
    format!(
        "{} ({})",
        format_duration(duration),
        DurationCategory::for_duration(duration)
    )
}

fn render_plain_text(session: &Session, duration: Duration, generated: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let thin_rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    push_line(&mut out, &rule);
    push_line(&mut out, "              TESTING SESSION REPORT");
    push_line(&mut out, &rule);
    push_line(&mut out, "");

    push_line(&mut out, &format!("Title: {}", session.title));
    push_line(&mut out, "");

    push_line(&mut out, "Areas Covered:");
    if !session.area_selections.is_empty() {
        push_line(&mut out, &format!("  {}", session.area_path()));
    }
    push_line(&mut out, "");

    push_line(&mut out, &format!("Start: {}", session.start_time_display));
    push_line(&mut out, "");
    push_line(&mut out, &format!("Duration: {}", duration_with_category(duration)));
    push_line(&mut out, "");
    push_line(&mut out, &format!("Tester(s): {}", session.tester_names));
    push_line(&mut out, "");

    push_line(&mut out, "Task Breakdown:");
    push_line(
        &mut out,
        &format!("  Session Setup:                 {:.1}%", session.session_setup),
    );
    push_line(
        &mut out,
        &format!("  Test Design & Execution:       {:.1}%", session.test_design_execution),
    );
    push_line(
        &mut out,
        &format!("  Bug Investigation & Reporting: {:.1}%", session.bug_investigation),
    );
    push_line(&mut out, "");

    push_line(
        &mut out,
        &format!(
            "Charter: {:.1}%  |  Opportunity: {:.1}%",
            session.charter_percent, session.opportunity_percent
        ),
    );
    push_line(&mut out, "");

    push_line(&mut out, "Attached Files:");
    if session.attached_files.is_empty() {
        push_line(&mut out, "  (none)");
    } else {
        for (index, file) in session.attached_files.iter().enumerate() {
            push_line(&mut out, &format!("  [{}] {file}", index + 1));
        }
    }
    push_line(&mut out, "");

    push_line(&mut out, "Test Notes:");
    push_line(&mut out, &thin_rule);
    push_line(&mut out, &session.test_notes);
    push_line(&mut out, &thin_rule);
    push_line(&mut out, "");

    push_line(&mut out, &rule);
    push_line(&mut out, &format!("BUGS ({})", session.bugs.len()));
    push_line(&mut out, &rule);
    for (index, bug) in session.bugs.iter().enumerate() {
        push_line(&mut out, "");
        push_line(&mut out, &format!("  Bug #{}:", index + 1));
        push_line(&mut out, &format!("    Title:           {}", bug.title));
        push_indented_block(&mut out, "    Description:", &bug.description);
        push_indented_block(&mut out, "    Result:", &bug.result);
        push_indented_block(&mut out, "    Expected Result:", &bug.expected_result);
        if !bug.related_files.is_empty() {
            push_line(
                &mut out,
                &format!("    Related Files:   {}", bug.related_files.join(", ")),
            );
        }
        push_line(&mut out, &thin_rule);
    }
    push_line(&mut out, "");

    push_line(&mut out, &rule);
    push_line(&mut out, &format!("ISSUES ({})", session.issues.len()));
    push_line(&mut out, &rule);
    for (index, issue) in session.issues.iter().enumerate() {
        push_line(&mut out, "");
        push_line(&mut out, &format!("  Issue #{}:", index + 1));
        push_line(&mut out, &format!("    Title:           {}", issue.title));
        push_indented_block(&mut out, "    Description:", &issue.description);
        push_line(&mut out, &thin_rule);
    }
    push_line(&mut out, "");

    push_line(&mut out, &rule);
    push_line(&mut out, &format!("Report generated: {generated}"));
    push_line(&mut out, &rule);
    out
}

fn push_indented_block(out: &mut String, heading: &str, text: &str) {
    push_line(out, heading);
    for line in text.split('\n') {
        push_line(out, &format!("{BLOCK_INDENT}{}", line.trim_end_matches('\r')));
    }
}

fn render_markdown(session: &Session, duration: Duration, generated: &str) -> String {
    let mut out = String::new();

    push_line(&mut out, "# Testing Session Report");
    push_line(&mut out, "");
    push_line(&mut out, &format!("## {}", session.title));
    push_line(&mut out, "");
    push_line(&mut out, "| Field | Value |");
    push_line(&mut out, "|-------|-------|");
    push_line(&mut out, &format!("| **Areas** | {} |", session.area_path()));
    push_line(&mut out, &format!("| **Start** | {} |", session.start_time_display));
    push_line(
        &mut out,
        &format!("| **Duration** | {} |", duration_with_category(duration)),
    );
    push_line(&mut out, &format!("| **Tester(s)** | {} |", session.tester_names));
    push_line(&mut out, "");

    push_line(&mut out, "### Task Breakdown");
    push_line(&mut out, "");
    push_line(&mut out, "| Task | % |");
    push_line(&mut out, "|------|---|");
    push_line(&mut out, &format!("| Session Setup | {:.1}% |", session.session_setup));
    push_line(
        &mut out,
        &format!("| Test Design & Execution | {:.1}% |", session.test_design_execution),
    );
    push_line(
        &mut out,
        &format!("| Bug Investigation & Reporting | {:.1}% |", session.bug_investigation),
    );
    push_line(&mut out, "");

    push_line(
        &mut out,
        &format!(
            "**Charter:** {:.1}% | **Opportunity:** {:.1}%",
            session.charter_percent, session.opportunity_percent
        ),
    );
    push_line(&mut out, "");

    push_line(&mut out, "### Attached Files");
    push_line(&mut out, "");
    if session.attached_files.is_empty() {
        push_line(&mut out, "_(none)_");
    } else {
        for file in &session.attached_files {
            push_line(&mut out, &format!("- `{file}`"));
        }
    }
    push_line(&mut out, "");

    push_line(&mut out, "### Test Notes");
    push_line(&mut out, "");
    push_line(&mut out, &session.test_notes);
    push_line(&mut out, "");

    push_line(&mut out, "---");
    push_line(&mut out, "");
    push_line(&mut out, &format!("### Bugs ({})", session.bugs.len()));
    push_line(&mut out, "");
    for (index, bug) in session.bugs.iter().enumerate() {
        push_line(&mut out, &format!("#### Bug #{}: {}", index + 1, bug.title));
        push_line(&mut out, "");
        push_line(&mut out, "**Description:**");
        push_line(&mut out, &bug.description);
        push_line(&mut out, "");
        push_line(&mut out, "**Result:**");
        push_line(&mut out, &bug.result);
        push_line(&mut out, "");
        push_line(&mut out, "**Expected Result:**");
        push_line(&mut out, &bug.expected_result);
        if !bug.related_files.is_empty() {
            let files = bug
                .related_files
                .iter()
                .map(|file| format!("`{file}`"))
                .collect::<Vec<_>>()
                .join(", ");
            push_line(&mut out, "");
            push_line(&mut out, &format!("**Related Files:** {files}"));
        }
        push_line(&mut out, "");
    }

    push_line(&mut out, "---");
    push_line(&mut out, "");
    push_line(&mut out, &format!("### Issues ({})", session.issues.len()));
    push_line(&mut out, "");
    for (index, issue) in session.issues.iter().enumerate() {
        push_line(&mut out, &format!("#### Issue #{}: {}", index + 1, issue.title));
        push_line(&mut out, "");
        push_line(&mut out, &issue.description);
        push_line(&mut out, "");
    }

    push_line(&mut out, "---");
    push_line(&mut out, &format!("_Report generated: {generated}_"));
    out
}

const HTML_STYLE: &str = "\
body{font-family:system-ui,sans-serif;max-width:900px;margin:2em auto;padding:0 1em;color:#222}
h1{border-bottom:2px solid #333}h2,h3{margin-top:1.5em}
table{border-collapse:collapse;width:100%}th,td{border:1px solid #ccc;padding:6px 10px;text-align:left}th{background:#f5f5f5}
.bug{border-left:4px solid #e44;padding:0.5em 1em;margin:1em 0;background:#fff8f8}
.issue{border-left:4px solid #f80;padding:0.5em 1em;margin:1em 0;background:#fffbf0}
pre{background:#f5f5f5;padding:1em;overflow-x:auto;white-space:pre-wrap}";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render_html(session: &Session, duration: Duration, generated: &str) -> String {
    let mut out = String::new();

    push_line(&mut out, "<!DOCTYPE html>");
    push_line(&mut out, "<html><head><meta charset=\"utf-8\"/>");
    push_line(
        &mut out,
        &format!("<title>Session Report - {}</title>", escape_html(&session.title)),
    );
    push_line(&mut out, "<style>");
    push_line(&mut out, HTML_STYLE);
    push_line(&mut out, "</style></head><body>");

    push_line(&mut out, "<h1>Testing Session Report</h1>");
    push_line(&mut out, &format!("<h2>{}</h2>", escape_html(&session.title)));

    push_line(&mut out, "<table><tbody>");
    push_line(
        &mut out,
        &format!("<tr><th>Areas</th><td>{}</td></tr>", escape_html(&session.area_path())),
    );
    push_line(
        &mut out,
        &format!(
            "<tr><th>Start</th><td>{}</td></tr>",
            escape_html(&session.start_time_display)
        ),
    );
    push_line(
        &mut out,
        &format!(
            "<tr><th>Duration</th><td>{}</td></tr>",
            duration_with_category(duration)
        ),
    );
    push_line(
        &mut out,
        &format!(
            "<tr><th>Tester(s)</th><td>{}</td></tr>",
            escape_html(&session.tester_names)
        ),
    );
    push_line(&mut out, "</tbody></table>");

    push_line(&mut out, "<h3>Task Breakdown</h3>");
    push_line(
        &mut out,
        "<table><thead><tr><th>Task</th><th>%</th></tr></thead><tbody>",
    );
    push_line(
        &mut out,
        &format!("<tr><td>Session Setup</td><td>{:.1}%</td></tr>", session.session_setup),
    );
    push_line(
        &mut out,
        &format!(
            "<tr><td>Test Design &amp; Execution</td><td>{:.1}%</td></tr>",
            session.test_design_execution
        ),
    );
    push_line(
        &mut out,
        &format!(
            "<tr><td>Bug Investigation &amp; Reporting</td><td>{:.1}%</td></tr>",
            session.bug_investigation
        ),
    );
    push_line(&mut out, "</tbody></table>");

    push_line(
        &mut out,
        &format!(
            "<p><strong>Charter:</strong> {:.1}% | <strong>Opportunity:</strong> {:.1}%</p>",
            session.charter_percent, session.opportunity_percent
        ),
    );

    push_line(&mut out, "<h3>Attached Files</h3>");
    if session.attached_files.is_empty() {
        push_line(&mut out, "<p><em>(none)</em></p>");
    } else {
        push_line(&mut out, "<ul>");
        for file in &session.attached_files {
            push_line(&mut out, &format!("<li><code>{}</code></li>", escape_html(file)));
        }
        push_line(&mut out, "</ul>");
    }

    push_line(&mut out, "<h3>Test Notes</h3>");
    push_line(&mut out, &format!("<pre>{}</pre>", escape_html(&session.test_notes)));

    push_line(&mut out, &format!("<h3>Bugs ({})</h3>", session.bugs.len()));
    for (index, bug) in session.bugs.iter().enumerate() {
        push_line(&mut out, "<div class=\"bug\">");
        push_line(
            &mut out,
            &format!("<h4>Bug #{}: {}</h4>", index + 1, escape_html(&bug.title)),
        );
        push_line(
            &mut out,
            &format!(
                "<p><strong>Description:</strong></p><pre>{}</pre>",
                escape_html(&bug.description)
            ),
        );
        push_line(
            &mut out,
            &format!(
                "<p><strong>Result:</strong></p><pre>{}</pre>",
                escape_html(&bug.result)
            ),
        );
        push_line(
            &mut out,
            &format!(
                "<p><strong>Expected Result:</strong></p><pre>{}</pre>",
                escape_html(&bug.expected_result)
            ),
        );
        if !bug.related_files.is_empty() {
            let files = bug
                .related_files
                .iter()
                .map(|file| format!("<code>{}</code>", escape_html(file)))
                .collect::<Vec<_>>()
                .join(", ");
            push_line(
                &mut out,
                &format!("<p><strong>Related Files:</strong> {files}</p>"),
            );
        }
        push_line(&mut out, "</div>");
    }

    push_line(&mut out, &format!("<h3>Issues ({})</h3>", session.issues.len()));
    for (index, issue) in session.issues.iter().enumerate() {
        push_line(&mut out, "<div class=\"issue\">");
        push_line(
            &mut out,
            &format!("<h4>Issue #{}: {}</h4>", index + 1, escape_html(&issue.title)),
        );
        push_line(&mut out, &format!("<pre>{}</pre>", escape_html(&issue.description)));
        push_line(&mut out, "</div>");
    }

    push_line(
        &mut out,
        &format!("<hr/><p><em>Report generated: {generated}</em></p>"),
    );
    push_line(&mut out, "</body></html>");
    out
}

/// Wire shape of the JSON report. Field order is part of the format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    title: &'a str,
    areas: &'a [String],
    start: &'a str,
    duration: String,
    duration_category: DurationCategory,
    testers: &'a str,
    task_breakdown: JsonTaskBreakdown,
    charter: f64,
    opportunity: f64,
    attached_files: &'a [String],
    test_notes: &'a str,
    bugs: Vec<JsonBug<'a>>,
    issues: Vec<JsonIssue<'a>>,
    report_generated: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonTaskBreakdown {
    session_setup: f64,
    test_design_execution: f64,
    bug_investigation_reporting: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonBug<'a> {
    title: &'a str,
    description: &'a str,
    result: &'a str,
    expected_result: &'a str,
    related_files: &'a [String],
}

#[derive(Debug, Serialize)]
struct JsonIssue<'a> {
    title: &'a str,
    description: &'a str,
}

fn render_json(session: &Session, duration: Duration, generated: &str) -> String {
    let report = JsonReport {
        title: &session.title,
        areas: &session.area_selections,
        start: &session.start_time_display,
        duration: format_duration(duration),
        duration_category: DurationCategory::for_duration(duration),
        testers: &session.tester_names,
        task_breakdown: JsonTaskBreakdown {
            session_setup: session.session_setup,
            test_design_execution: session.test_design_execution,
            bug_investigation_reporting: session.bug_investigation,
        },
        charter: session.charter_percent,
        opportunity: session.opportunity_percent,
        attached_files: &session.attached_files,
        test_notes: &session.test_notes,
        bugs: session
            .bugs
            .iter()
            .map(|bug| JsonBug {
                title: &bug.title,
                description: &bug.description,
                result: &bug.result,
                expected_result: &bug.expected_result,
                related_files: &bug.related_files,
            })
            .collect(),
        issues: session
            .issues
            .iter()
            .map(|issue| JsonIssue {
                title: &issue.title,
                description: &issue.description,
            })
            .collect(),
        report_generated: generated,
    };

    // Only plain strings, numbers and sequences: serialization cannot fail.
    serde_json::to_string_pretty(&report).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;

    use super::{escape_html, render_report, ExportFormat};
    use crate::domain::{BugEntry, IssueEntry, Session};

    fn sample_session() -> Session {
        Session {
            title: "Login <script>".to_string(),
            area_selections: vec!["Web".to_string(), "Auth".to_string()],
            start_time_display: "01/02/2026 09:00 AM UTC".to_string(),
            tester_names: "Ana & Bo".to_string(),
            session_setup: 10.0,
            test_design_execution: 70.0,
            bug_investigation: 20.0,
            charter_percent: 75.5,
            opportunity_percent: 24.5,
            attached_files: vec!["/logs/a.log".to_string(), "/shots/b.png".to_string()],
            test_notes: "line one\nline \"two\"".to_string(),
            bugs: vec![BugEntry {
                title: "Crash".to_string(),
                description: "Step 1\r\nStep 2".to_string(),
                result: "boom".to_string(),
                expected_result: "no boom".to_string(),
                related_files: vec!["/logs/a.log".to_string()],
            }],
            issues: vec![IssueEntry {
                title: "Slow".to_string(),
                description: "takes 5s".to_string(),
            }],
            ..Session::default()
        }
    }

    fn generated_at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn plain_text_sections_in_order() {
        let text = render_report(
            &sample_session(),
            Duration::seconds(5025),
            ExportFormat::PlainText,
            generated_at(),
        );
        let markers = [
            "TESTING SESSION REPORT",
            "Title: Login <script>",
            "Areas Covered:\n  Web > Auth",
            "Start: 01/02/2026 09:00 AM UTC",
            "Duration: 1h 23m 45s (MEDIUM)",
            "Tester(s): Ana & Bo",
            "  Session Setup:                 10.0%",
            "Charter: 75.5%  |  Opportunity: 24.5%",
            "  [1] /logs/a.log\n  [2] /shots/b.png",
            "Test Notes:",
            "BUGS (1)",
            "\n  Bug #1:\n    Title:           Crash",
            "    Related Files:   /logs/a.log",
            "ISSUES (1)",
            "  Issue #1:",
            "Report generated: 2026-02-01 12:30:05 UTC",
        ];
        let mut cursor = 0;
        for marker in markers {
            let position = text[cursor..]
                .find(marker)
                .unwrap_or_else(|| panic!("missing or out of order: {marker}"));
            cursor += position + marker.len();
        }
    }

    #[test]
    fn plain_text_indents_multiline_blocks() {
        let text = render_report(
            &sample_session(),
            Duration::zero(),
            ExportFormat::PlainText,
            generated_at(),
        );
        assert!(text.contains(
            "    Description:\n                     Step 1\n                     Step 2\n"
        ));
    }

    #[test]
    fn plain_text_marks_empty_attachments() {
        let text = render_report(
            &Session::default(),
            Duration::zero(),
            ExportFormat::PlainText,
            generated_at(),
        );
        assert!(text.contains("Attached Files:\n  (none)\n"));
        assert!(text.contains("Duration: 0s (SMALL)"));
        assert!(text.contains("BUGS (0)"));
    }

    #[test]
    fn markdown_layout() {
        let text = render_report(
            &sample_session(),
            Duration::seconds(90),
            ExportFormat::Markdown,
            generated_at(),
        );
        assert!(text.starts_with("# Testing Session Report\n\n## Login <script>\n"));
        assert!(text.contains("| **Areas** | Web > Auth |"));
        assert!(text.contains("| **Duration** | 1m 30s (SMALL) |"));
        assert!(text.contains("**Charter:** 75.5% | **Opportunity:** 24.5%"));
        assert!(text.contains("- `/shots/b.png`"));
        assert!(text.contains("#### Bug #1: Crash"));
        assert!(text.contains("**Related Files:** `/logs/a.log`"));
        assert!(text.contains("#### Issue #1: Slow"));
        assert!(text.ends_with("---\n_Report generated: 2026-02-01 12:30:05 UTC_\n"));
    }

    #[test]
    fn html_escapes_user_fields() {
        let text = render_report(
            &sample_session(),
            Duration::hours(5),
            ExportFormat::Html,
            generated_at(),
        );
        assert!(text.contains("<title>Session Report - Login &lt;script&gt;</title>"));
        assert!(text.contains("<h2>Login &lt;script&gt;</h2>"));
        assert!(text.contains("<tr><th>Areas</th><td>Web &gt; Auth</td></tr>"));
        assert!(text.contains("<tr><th>Tester(s)</th><td>Ana &amp; Bo</td></tr>"));
        assert!(text.contains("<tr><th>Duration</th><td>5h 0m 0s (LONG)</td></tr>"));
        assert!(text.contains("<pre>line one\nline &quot;two&quot;</pre>"));
        assert!(!text.contains("<script>"));
    }

    #[test]
    fn escape_html_handles_all_specials() {
        assert_eq!(escape_html("a&b<c>d\"e'"), "a&amp;b&lt;c&gt;d&quot;e'");
    }

    #[test]
    fn json_uses_camel_case_schema() {
        let text = render_report(
            &sample_session(),
            Duration::seconds(5025),
            ExportFormat::Json,
            generated_at(),
        );
        let value: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["duration"], "1h 23m 45s");
        assert_eq!(value["durationCategory"], "MEDIUM");
        assert_eq!(value["areas"][1], "Auth");
        assert_eq!(value["taskBreakdown"]["bugInvestigationReporting"], 20.0);
        assert_eq!(value["bugs"][0]["expectedResult"], "no boom");
        assert_eq!(value["bugs"][0]["relatedFiles"][0], "/logs/a.log");
        assert_eq!(value["issues"][0]["description"], "takes 5s");
        assert_eq!(value["reportGenerated"], "2026-02-01 12:30:05 UTC");

        let keys = value
            .as_object()
            .expect("object")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(keys.len(), 14);
        assert!(text.find("\"title\"") < text.find("\"areas\""));
        assert!(text.find("\"testNotes\"") < text.find("\"bugs\""));
    }

    #[test]
    fn format_metadata() {
        assert_eq!(ExportFormat::Markdown.extension(), ".md");
        assert_eq!(ExportFormat::Json.display_name(), "JSON (.json)");
        assert_eq!(ExportFormat::default(), ExportFormat::PlainText);
    }
}
