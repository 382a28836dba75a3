use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod dispatch;
pub mod log_buffer;
pub mod projection;
pub mod protocol;

pub use dispatch::{dispatch, Dispatch};
pub use log_buffer::{BoundedLogBuffer, DEFAULT_LOG_CAPACITY};
pub use projection::{ProjectState, ReconcileReport, Reconciliation, Revisions};
pub use protocol::{ClientFrame, FrameError, FrameKind, ServerFrame};

const MAX_PROJECT_NAME_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Stopped,
    Running,
    Paused,
    Crashed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Stopped => "stopped",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Crashed => "crashed",
        }
    }

    /// Running and paused agents still hold a live process on the server.
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Running | AgentStatus::Paused)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "stopped" => Ok(AgentStatus::Stopped),
            "running" => Ok(AgentStatus::Running),
            "paused" => Ok(AgentStatus::Paused),
            "crashed" => Ok(AgentStatus::Crashed),
            other => Err(format!("Unknown agent status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub passing: u32,
    #[serde(default)]
    pub in_progress: u32,
    pub total: u32,
    pub percentage: f64,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.passing >= self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub line: String,
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(line: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Wall-clock label for rendering. The server emits local ISO-8601 without
    /// an offset; RFC 3339 is accepted too. Unparseable stamps are shown raw.
    pub fn time_label(&self) -> String {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return parsed.format("%H:%M:%S").to_string();
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
            return parsed.format("%H:%M:%S").to_string();
        }
        self.timestamp.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentQuestion {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub answered_at: Option<String>,
}

/// Same rule the server applies before accepting a project socket or route.
pub fn is_valid_project_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PROJECT_NAME_LEN
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
