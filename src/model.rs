use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub user_agent: String,
}

/// Lifecycle of a single scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Idle,
    Initializing,
    Scanning,
    Complete,
    Error,
}

impl RunStatus {
    /// `COMPLETE` and `ERROR` end a run; nothing polls after either.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error)
    }

    pub fn is_running(self) -> bool {
        matches!(self, RunStatus::Initializing | RunStatus::Scanning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Initializing => "INITIALIZING",
            RunStatus::Scanning => "SCANNING",
            RunStatus::Complete => "COMPLETE",
            RunStatus::Error => "ERROR",
        }
    }

    /// Parse a status reported by the job server. `IDLE` is local-only.
    pub fn from_remote(s: &str) -> Option<Self> {
        match s {
            "INITIALIZING" => Some(RunStatus::Initializing),
            "SCANNING" => Some(RunStatus::Scanning),
            "COMPLETE" => Some(RunStatus::Complete),
            "ERROR" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    #[default]
    Info,
    Success,
    Error,
    Step,
    #[serde(other)]
    Unknown,
}

/// One line of the remote run's activity trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: LogKind,
}

impl LogEntry {
    /// Build an entry produced on this side of the wire, stamped with the current UTC time.
    pub fn local(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            message: message.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "MEDIUM" => RiskLevel::Medium,
            "HIGH" => RiskLevel::High,
            "CRITICAL" => RiskLevel::Critical,
            _ => RiskLevel::Low,
        }
    }
}

/// Absent, null or unrecognised risk strings all read as `LOW`.
fn lenient_risk<'de, D>(deserializer: D) -> Result<RiskLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(RiskLevel::from_wire).unwrap_or_default())
}

/// `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Servers send either prose or a table of counts; objects render as `key: value` pairs.
fn lenient_summary<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}: {s}"),
                other => format!("{k}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    })
}

/// A report that still fails to decode is dropped so status and logs from the same
/// payload apply.
fn lenient_report<'de, D>(deserializer: D) -> Result<Option<Report>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => match serde_json::from_value(value) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable report");
                None
            }
        },
    })
}

/// Unknown status strings are dropped so the rest of the payload still applies.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<RunStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(RunStatus::from_remote))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_risk")]
    pub severity: RiskLevel,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestedInput {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: String,
}

/// Final findings artifact, produced once by the job server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, deserialize_with = "lenient_risk")]
    pub risk_level: RiskLevel,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(default, deserialize_with = "lenient_summary")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps_completed: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pages_visited: Vec<String>,
    // Shape of discovered inputs varies by scanner; only the count is consumed.
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs_found: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs_tested: Vec<TestedInput>,
    #[serde(default, deserialize_with = "null_as_default", alias = "findings")]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendations: Vec<String>,
}

/// `POST /attack` request body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest<'a> {
    pub url: &'a str,
}

/// `POST /attack` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "runId")]
    pub run_id: String,
}

/// `GET /status/{runId}` response body. Every field is optional; an absent field leaves
/// the corresponding run state untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPayload {
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub logs: Option<Vec<LogEntry>>,
    #[serde(default, deserialize_with = "lenient_report")]
    pub report: Option<Report>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub active_scans: u64,
}

/// Everything a renderer needs to draw the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub run_id: Option<String>,
    pub target: Option<String>,
    pub logs: Vec<LogEntry>,
    pub progress_step: u32,
    pub progress_percent: u8,
    pub is_running: bool,
    pub polling: bool,
    pub report: Option<Report>,
    pub report_visible: bool,
}

/// Events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Snapshot(Box<RunSnapshot>),
    RunFinished(Box<RunSnapshot>),
    Info(String),
}
