//! Application-level orchestration.
//!
//! This module owns the scan-run lifecycle (submit/poll/reset), derives progress from the
//! log stream, gates report visibility, and handles post-run processing. UI/CLI layers call
//! into this module to keep responsibilities separated.

mod controller;
mod poller;
mod post_process;
mod reconcile;
mod report_gate;

pub(crate) use controller::{run_controller, RunController, UiCommand};
pub(crate) use post_process::{export_report_json, process_run_completion};
