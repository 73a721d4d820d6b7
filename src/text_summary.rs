//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for a report and for log entries in text mode.

use crate::model::{LogEntry, LogKind, Report, RunSnapshot};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished report.
pub(crate) fn build_report_summary(report: &Report) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Risk level: {}", report.risk_level.as_str()));
    if !report.target.is_empty() {
        lines.push(format!("Target: {}", report.target));
    }
    lines.push(format!(
        "Steps: {}  Pages: {}  Inputs: {}  Vulnerabilities: {}",
        report.steps_completed,
        report.pages_visited.len(),
        report.inputs_found.len(),
        report.vulnerabilities.len()
    ));
    if report.summary.trim().is_empty() {
        lines.push("Summary: No summary available.".to_string());
    } else {
        lines.push(format!("Summary: {}", report.summary.trim()));
    }

    for v in &report.vulnerabilities {
        lines.push(format!(
            "  [{}] {} at {}: {}",
            v.severity.as_str(),
            v.kind,
            v.location,
            v.description
        ));
    }
    for t in &report.inputs_tested {
        lines.push(format!("  tested {} with {:?} -> {}", t.input, t.payload, t.result));
    }
    for page in &report.pages_visited {
        lines.push(format!("  visited {page}"));
    }
    for rec in &report.recommendations {
        lines.push(format!("  - {rec}"));
    }

    TextSummary { lines }
}

/// One log entry as a terminal line.
pub(crate) fn format_log_entry(entry: &LogEntry) -> String {
    let tag = match entry.kind {
        LogKind::Error => "ERR ",
        LogKind::Success => "OK  ",
        LogKind::Step => "STEP",
        LogKind::Info | LogKind::Unknown => "INFO",
    };
    format!("[{}] {} {}", entry.timestamp, tag, entry.message)
}

/// Status line shown while a run is active.
pub(crate) fn format_progress(snapshot: &RunSnapshot) -> String {
    format!(
        "{}: step {} ({}%)",
        snapshot.status.as_str(),
        snapshot.progress_step,
        snapshot.progress_percent
    )
}
