//! Run lifecycle controller.
//!
//! Owns the scan-run state machine, starts and stops the poller, and emits snapshots for
//! presentation layers.

use super::poller::{PollMessage, Poller};
use super::reconcile::{progress_percent, progress_step};
use super::report_gate::ReportGate;
use crate::api::ScanApi;
use crate::model::{LogEntry, LogKind, RunEvent, RunSnapshot, RunStatus};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Commands emitted by UI layers to control the run.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(String),
    Reset,
    ToggleReport,
    HideReport,
    ShowReport,
    Quit,
}

/// State machine for one scan run at a time:
/// `IDLE -> INITIALIZING -> SCANNING -> COMPLETE | ERROR`.
///
/// All mutation goes through `begin_submit`/`finish_submit`, `apply_poll`, `reset` and the
/// report visibility actions, from a single task.
pub(crate) struct RunController<A: ScanApi> {
    api: Arc<A>,
    poll_interval: Duration,
    poll_tx: UnboundedSender<PollMessage>,
    generation: u64,
    poller: Option<Poller>,

    status: RunStatus,
    run_id: Option<String>,
    target: Option<String>,
    logs: Vec<LogEntry>,
    progress_step: u32,
    gate: ReportGate,
}

impl<A: ScanApi> RunController<A> {
    /// Create an idle controller. The returned receiver yields poll results and must be fed
    /// back through [`RunController::apply_poll`].
    pub fn new(api: Arc<A>, poll_interval: Duration) -> (Self, UnboundedReceiver<PollMessage>) {
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let controller = Self {
            api,
            poll_interval,
            poll_tx,
            generation: 0,
            poller: None,
            status: RunStatus::Idle,
            run_id: None,
            target: None,
            logs: Vec::new(),
            progress_step: 0,
            gate: ReportGate::default(),
        };
        (controller, poll_rx)
    }

    pub fn api(&self) -> Arc<A> {
        self.api.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_active)
    }

    /// Discard the previous run, enter `INITIALIZING` and record the local start entry.
    /// Returns the generation the pending submission belongs to.
    pub fn begin_submit(&mut self, url: &str) -> Result<u64> {
        let url = url.trim();
        if url.is_empty() {
            bail!("a target URL is required");
        }
        if self.status.is_running() {
            bail!("a scan is already running; reset it first");
        }
        self.clear_run();
        self.status = RunStatus::Initializing;
        self.target = Some(url.to_string());
        self.logs.push(LogEntry::local(
            LogKind::Info,
            format!("Initializing scan on {url}..."),
        ));
        tracing::info!(target_url = %url, generation = self.generation, "submitting scan");
        Ok(self.generation)
    }

    /// Apply the outcome of the submission issued by `begin_submit`. Outcomes for a run
    /// that was reset or replaced meanwhile are dropped; returns whether it was applied.
    pub fn finish_submit(&mut self, generation: u64, outcome: Result<String>) -> bool {
        if generation != self.generation || self.status != RunStatus::Initializing {
            tracing::debug!(generation, "ignoring superseded submission result");
            return false;
        }
        match outcome {
            Ok(run_id) => {
                tracing::info!(run_id = %run_id, "scan accepted, polling for status");
                self.poller = Some(Poller::start(
                    self.api.clone(),
                    run_id.clone(),
                    self.generation,
                    self.poll_interval,
                    self.poll_tx.clone(),
                ));
                self.run_id = Some(run_id);
                self.status = RunStatus::Scanning;
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "scan submission failed");
                self.logs.push(LogEntry::local(
                    LogKind::Error,
                    format!("Connection failed: {e:#}"),
                ));
                self.status = RunStatus::Error;
            }
        }
        true
    }

    /// Merge one poll result. Status, logs and report land together; results from a
    /// superseded run or arriving after polling stopped are dropped. Returns whether the
    /// message was applied.
    pub fn apply_poll(&mut self, msg: PollMessage) -> bool {
        let current = self
            .poller
            .as_ref()
            .is_some_and(|p| p.is_active() && p.generation() == msg.generation);
        if msg.generation != self.generation || !current {
            tracing::debug!(
                generation = msg.generation,
                current = self.generation,
                "dropping stale poll result"
            );
            return false;
        }

        let payload = msg.payload;
        if let Some(logs) = payload.logs {
            self.progress_step = progress_step(&logs);
            self.logs = logs;
        }
        if let Some(report) = payload.report {
            self.gate.deliver(report);
        }
        if let Some(status) = payload.status {
            self.status = status;
            if status.is_terminal() {
                tracing::info!(
                    run_id = self.run_id.as_deref().unwrap_or("-"),
                    status = status.as_str(),
                    "run finished"
                );
                self.stop_poller();
            }
        }
        true
    }

    /// Cancel polling and return to the initial `IDLE` state.
    pub fn reset(&mut self) {
        self.clear_run();
        self.status = RunStatus::Idle;
    }

    pub fn toggle_report(&mut self) {
        self.gate.toggle();
    }

    pub fn hide_report(&mut self) {
        self.gate.hide();
    }

    pub fn reveal_report(&mut self) {
        self.gate.reveal();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            run_id: self.run_id.clone(),
            target: self.target.clone(),
            logs: self.logs.clone(),
            progress_step: self.progress_step,
            progress_percent: progress_percent(self.progress_step),
            is_running: self.status.is_running(),
            polling: self.is_polling(),
            report: self.gate.report().cloned(),
            report_visible: self.gate.is_visible(),
        }
    }

    fn clear_run(&mut self) {
        self.stop_poller();
        self.generation += 1;
        self.run_id = None;
        self.target = None;
        self.logs.clear();
        self.progress_step = 0;
        self.gate.clear();
    }

    fn stop_poller(&mut self) {
        if let Some(p) = self.poller.take() {
            p.stop();
        }
    }
}

fn publish<A: ScanApi>(
    controller: &RunController<A>,
    was_terminal: bool,
    event_tx: &UnboundedSender<RunEvent>,
) {
    let snapshot = controller.snapshot();
    let finished = !was_terminal && snapshot.status.is_terminal();
    let _ = event_tx.send(RunEvent::Snapshot(Box::new(snapshot.clone())));
    if finished {
        let _ = event_tx.send(RunEvent::RunFinished(Box::new(snapshot)));
    }
}

fn abort_submission(task: &mut Option<JoinHandle<()>>) {
    if let Some(t) = task.take() {
        t.abort();
    }
}

/// Drive `controller` from UI commands and poll results, emitting a snapshot after every
/// change. Returns the last snapshot once asked to quit.
///
/// Submissions run on their own task so commands keep flowing while the server is slow.
pub(crate) async fn run_controller<A: ScanApi>(
    mut controller: RunController<A>,
    mut poll_rx: UnboundedReceiver<PollMessage>,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<RunSnapshot> {
    let (submit_tx, mut submit_rx) = mpsc::unbounded_channel::<(u64, Result<String>)>();
    let mut submission: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let was_terminal = controller.status().is_terminal();
                match cmd {
                    Some(UiCommand::Submit(url)) => {
                        let generation = match controller.begin_submit(&url) {
                            Ok(g) => g,
                            Err(e) => {
                                let _ = event_tx.send(RunEvent::Info(format!("{e:#}")));
                                continue;
                            }
                        };
                        // Observers see INITIALIZING before the network answers.
                        publish(&controller, was_terminal, &event_tx);
                        abort_submission(&mut submission);
                        let api = controller.api();
                        let tx = submit_tx.clone();
                        let url = url.trim().to_string();
                        submission = Some(tokio::spawn(async move {
                            let outcome = api.submit(&url).await;
                            let _ = tx.send((generation, outcome));
                        }));
                    }
                    Some(UiCommand::Reset) => {
                        abort_submission(&mut submission);
                        controller.reset();
                        publish(&controller, was_terminal, &event_tx);
                    }
                    Some(UiCommand::ToggleReport) => {
                        controller.toggle_report();
                        publish(&controller, was_terminal, &event_tx);
                    }
                    Some(UiCommand::HideReport) => {
                        controller.hide_report();
                        publish(&controller, was_terminal, &event_tx);
                    }
                    Some(UiCommand::ShowReport) => {
                        controller.reveal_report();
                        publish(&controller, was_terminal, &event_tx);
                    }
                    Some(UiCommand::Quit) | None => {
                        abort_submission(&mut submission);
                        controller.stop_poller();
                        break;
                    }
                }
            }
            Some((generation, outcome)) = submit_rx.recv() => {
                submission = None;
                if controller.finish_submit(generation, outcome) {
                    publish(&controller, false, &event_tx);
                }
            }
            Some(msg) = poll_rx.recv() => {
                let was_terminal = controller.status().is_terminal();
                if controller.apply_poll(msg) {
                    publish(&controller, was_terminal, &event_tx);
                }
            }
        }
    }
    Ok(controller.snapshot())
}
