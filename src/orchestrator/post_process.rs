//! Post-run processing utilities.
//!
//! Handles report export and the closing summary once a run reaches a terminal state.

use crate::model::{Report, RunSnapshot, RunStatus};
use anyhow::{Context, Result};
use std::path::Path;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub summary_lines: Vec<String>,
    pub export_messages: Vec<String>,
}

/// Process a finished run: render the report summary and export it if asked to.
pub(crate) fn process_run_completion(
    snapshot: &RunSnapshot,
    export_json: Option<&Path>,
) -> ProcessedRun {
    let mut summary_lines = Vec::new();
    match (snapshot.status, snapshot.report.as_ref()) {
        (_, Some(report)) if snapshot.report_visible => {
            summary_lines.extend(crate::text_summary::build_report_summary(report).lines);
        }
        (_, Some(_)) => summary_lines.push("Report received (hidden)".to_string()),
        (RunStatus::Error, None) => summary_lines.push("Scan ended with an error".to_string()),
        _ => summary_lines.push("Scan finished without a report".to_string()),
    }

    let mut export_messages = Vec::new();
    if let Some(path) = export_json {
        match snapshot.report.as_ref() {
            Some(report) => match export_report_json(path, report) {
                Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
                Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
            },
            None => export_messages.push("No report to export".to_string()),
        }
    }

    ProcessedRun {
        summary_lines,
        export_messages,
    }
}

/// Write `report` as pretty JSON, creating parent directories as needed.
pub(crate) fn export_report_json(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(report).context("serialize report")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
