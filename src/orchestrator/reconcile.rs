//! Derive the progress step from a full log snapshot.

use crate::model::{LogEntry, LogKind};
use regex::Regex;
use std::sync::LazyLock;

static STEP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Step (\d+)\]").expect("step marker pattern"));

/// Walk `logs` in order and return the index from the last `step` entry carrying a
/// `[Step N]` marker, or 0 when there is none.
///
/// Last marker wins even if it is smaller than an earlier one.
pub(crate) fn progress_step(logs: &[LogEntry]) -> u32 {
    let mut step = 0;
    for entry in logs.iter().filter(|e| e.kind == LogKind::Step) {
        if let Some(n) = parse_step_marker(&entry.message) {
            step = n;
        }
    }
    step
}

fn parse_step_marker(message: &str) -> Option<u32> {
    STEP_MARKER
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Share of the run covered so far, as shown on the progress bar.
pub(crate) fn progress_percent(step: u32) -> u8 {
    step.saturating_mul(8).min(100) as u8
}
