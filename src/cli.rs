use crate::api::{HttpScanApi, ScanApi};
use crate::model::{LogEntry, RunConfig, RunEvent, RunSnapshot, RunStatus};
use crate::orchestrator::{self, RunController, UiCommand};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (mpsc::UnboundedSender<OutputLine>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

const COMMAND_HELP: &str = "\
Commands:
  scan <url>   Start a new scan (s)
  reset        Cancel polling and clear the run (r)
  toggle       Hide/show the report (t)
  hide | show  Hide or show the report
  help         Show this help (?)
  quit         Exit (q)";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scan-watch",
    version,
    about = "Launch a remote security scan and follow it until the report is ready"
)]
pub struct Cli {
    /// Target URL to scan
    pub url: Option<String>,

    /// Base URL of the scan job server
    #[arg(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Interval between status polls
    #[arg(long, default_value = "2s")]
    pub poll_interval: humantime::Duration,

    /// Print the final run snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export the final report as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Keep reading commands from stdin instead of exiting when the run ends
    #[arg(long)]
    pub interactive: bool,

    /// Query the server health endpoint and exit
    #[arg(long)]
    pub health: bool,

    /// Enable debug diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        bail!("--silent can only be used with --json. Use --silent --json together.");
    }
    if args.interactive && args.json {
        bail!("--interactive is only available in text mode");
    }

    let cfg = build_config(&args);
    if cfg.poll_interval.is_zero() {
        bail!("--poll-interval must be greater than zero");
    }
    let api = Arc::new(HttpScanApi::new(&cfg)?);

    if args.health {
        return run_health(api.as_ref(), &args).await;
    }

    let url = args.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    if url.is_none() && !args.interactive {
        bail!("a target URL is required (or use --interactive)");
    }

    if args.json {
        return run_json(&args, &cfg, api).await;
    }
    run_text(&args, &cfg, api).await
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        user_agent: format!("scan-watch/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Spawn the controller task and return its event stream, command sender and handle.
fn spawn_controller<A: ScanApi>(
    api: Arc<A>,
    cfg: &RunConfig,
) -> (
    UnboundedReceiver<RunEvent>,
    UnboundedSender<UiCommand>,
    JoinHandle<Result<RunSnapshot>>,
) {
    let (controller, poll_rx) = RunController::new(api, cfg.poll_interval);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let handle = tokio::spawn(orchestrator::run_controller(
        controller, poll_rx, event_tx, cmd_rx,
    ));
    (event_rx, cmd_tx, handle)
}

async fn run_health<A: ScanApi>(api: &A, args: &Cli) -> Result<()> {
    let health = api.health().await.context("health check failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else if !args.silent {
        println!(
            "Server {}: {} ({} active scans)",
            args.base_url, health.status, health.active_scans
        );
    }
    Ok(())
}

/// Run a single scan to completion and print the final snapshot as JSON.
async fn run_json<A: ScanApi>(args: &Cli, cfg: &RunConfig, api: Arc<A>) -> Result<()> {
    let (mut evt_rx, cmd_tx, handle) = spawn_controller(api, cfg);
    let interrupt = spawn_interrupt_handler(cmd_tx.clone());
    let url = args.url.clone().unwrap_or_default();
    let _ = cmd_tx.send(UiCommand::Submit(url));

    let mut finished: Option<RunSnapshot> = None;
    let mut rejected: Option<String> = None;
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            RunEvent::Snapshot(_) => {}
            RunEvent::RunFinished(s) => {
                finished = Some(*s);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            RunEvent::Info(msg) => {
                rejected = Some(msg);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
        }
    }

    let last = handle.await.context("controller task failed")??;
    interrupt.abort();
    if let Some(msg) = rejected {
        bail!(msg);
    }
    let snapshot = finished.unwrap_or(last);

    if let (Some(path), Some(report)) = (args.export_json.as_deref(), snapshot.report.as_ref()) {
        orchestrator::export_report_json(path, report)?;
    }

    if !args.silent {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    if snapshot.status == RunStatus::Error {
        bail!("scan ended with status ERROR");
    }
    Ok(())
}

/// Tracks what has already been written so each snapshot only prints what changed.
#[derive(Default)]
struct SnapshotPrinter {
    seen: Vec<LogEntry>,
    last_progress: Option<(RunStatus, u32)>,
    report_visible: bool,
    finished: bool,
}

impl SnapshotPrinter {
    fn on_snapshot(&mut self, s: &RunSnapshot, out: &UnboundedSender<OutputLine>) {
        // Logs arrive as full replacements; print only past the shared prefix.
        let shared = self
            .seen
            .iter()
            .zip(s.logs.iter())
            .take_while(|(a, b)| a == b)
            .count();
        for entry in &s.logs[shared..] {
            let _ = out.send(OutputLine::Stderr(crate::text_summary::format_log_entry(
                entry,
            )));
        }
        self.seen = s.logs.clone();

        if s.is_running {
            self.finished = false;
            let progress = (s.status, s.progress_step);
            if self.last_progress != Some(progress) {
                let _ = out.send(OutputLine::Stderr(crate::text_summary::format_progress(s)));
                self.last_progress = Some(progress);
            }
        } else if s.status == RunStatus::Idle {
            self.last_progress = None;
            self.finished = false;
        }

        if self.finished && s.report_visible != self.report_visible {
            match s.report.as_ref() {
                Some(report) if s.report_visible => {
                    for line in crate::text_summary::build_report_summary(report).lines {
                        let _ = out.send(OutputLine::Stdout(line));
                    }
                }
                _ => {
                    let _ = out.send(OutputLine::Stderr("Report hidden".into()));
                }
            }
        }
        self.report_visible = s.report_visible;
    }

    fn on_finished(&mut self, s: &RunSnapshot, args: &Cli, out: &UnboundedSender<OutputLine>) {
        let _ = out.send(OutputLine::Stderr(format!("== {} ==", s.status.as_str())));
        let processed = orchestrator::process_run_completion(s, args.export_json.as_deref());
        for line in processed.summary_lines {
            let _ = out.send(OutputLine::Stdout(line));
        }
        for msg in processed.export_messages {
            let _ = out.send(OutputLine::Stderr(msg));
        }
        self.report_visible = s.report_visible;
        self.finished = true;
    }
}

/// Ask the controller to quit on Ctrl-C so polling stops before the process exits.
fn spawn_interrupt_handler(cmd_tx: UnboundedSender<UiCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
            let _ = cmd_tx.send(UiCommand::Quit);
        }
    })
}

/// Parse one line typed in interactive mode.
fn parse_command(line: &str) -> Option<std::result::Result<UiCommand, &'static str>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word {
        "" => return None,
        "s" | "scan" if rest.is_empty() => return Some(Err("usage: scan <url>")),
        "s" | "scan" => UiCommand::Submit(rest.to_string()),
        "r" | "reset" => UiCommand::Reset,
        "t" | "toggle" => UiCommand::ToggleReport,
        "hide" => UiCommand::HideReport,
        "show" => UiCommand::ShowReport,
        "q" | "quit" | "exit" => UiCommand::Quit,
        "?" | "help" => return Some(Err(COMMAND_HELP)),
        _ => return Some(Err("unknown command, type `help`")),
    };
    Some(Ok(cmd))
}

/// Forward stdin lines to the controller until EOF or `quit`.
fn spawn_command_reader(
    cmd_tx: UnboundedSender<UiCommand>,
    out_tx: UnboundedSender<OutputLine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            match parse_command(&line) {
                Some(Ok(UiCommand::Quit)) => break,
                Some(Ok(cmd)) => {
                    if cmd_tx.send(cmd).is_err() {
                        return;
                    }
                }
                Some(Err(msg)) => {
                    let _ = out_tx.send(OutputLine::Stderr(msg.to_string()));
                }
                None => {}
            }
        }
        let _ = cmd_tx.send(UiCommand::Quit);
    })
}

async fn run_text<A: ScanApi>(args: &Cli, cfg: &RunConfig, api: Arc<A>) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (mut evt_rx, cmd_tx, handle) = spawn_controller(api, cfg);
    let interrupt = spawn_interrupt_handler(cmd_tx.clone());

    let reader = if args.interactive {
        let _ = out_tx.send(OutputLine::Stderr(COMMAND_HELP.to_string()));
        Some(spawn_command_reader(cmd_tx.clone(), out_tx.clone()))
    } else {
        None
    };
    if let Some(url) = args.url.clone().filter(|u| !u.trim().is_empty()) {
        let _ = cmd_tx.send(UiCommand::Submit(url));
    }

    let mut printer = SnapshotPrinter::default();
    let mut rejected: Option<String> = None;
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            RunEvent::Snapshot(s) => printer.on_snapshot(&s, &out_tx),
            RunEvent::RunFinished(s) => {
                printer.on_finished(&s, args, &out_tx);
                if !args.interactive {
                    let _ = cmd_tx.send(UiCommand::Quit);
                }
            }
            RunEvent::Info(msg) => {
                if args.interactive {
                    let _ = out_tx.send(OutputLine::Stderr(msg));
                } else {
                    rejected = Some(msg);
                    let _ = cmd_tx.send(UiCommand::Quit);
                }
            }
        }
    }

    let last = handle.await.context("controller task failed")??;
    interrupt.abort();
    if let Some(reader) = reader {
        // Blocked on stdin; nothing left to forward commands to.
        reader.abort();
    }
    drop(out_tx);
    let _ = out_handle.await;

    if let Some(msg) = rejected {
        bail!(msg);
    }
    if !args.interactive && last.status == RunStatus::Error {
        bail!("scan ended with status ERROR");
    }
    Ok(())
}
