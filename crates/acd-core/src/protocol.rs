use crate::{AgentQuestion, AgentStatus, LogEntry, ProgressSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Server → client frames, one JSON object per frame discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    AgentStatus { status: AgentStatus },
    Progress(ProgressSnapshot),
    Log(LogEntry),
    AgentQuestion { question: AgentQuestion },
    Pong,
}

impl ServerFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            ServerFrame::AgentStatus { .. } => FrameKind::AgentStatus,
            ServerFrame::Progress(_) => FrameKind::Progress,
            ServerFrame::Log(_) => FrameKind::Log,
            ServerFrame::AgentQuestion { .. } => FrameKind::AgentQuestion,
            ServerFrame::Pong => FrameKind::Pong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    AgentStatus,
    Progress,
    Log,
    AgentQuestion,
    Pong,
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::AgentStatus,
        FrameKind::Progress,
        FrameKind::Log,
        FrameKind::AgentQuestion,
        FrameKind::Pong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::AgentStatus => "agent_status",
            FrameKind::Progress => "progress",
            FrameKind::Log => "log",
            FrameKind::AgentQuestion => "agent_question",
            FrameKind::Pong => "pong",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == kind)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → server frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Known(ServerFrame),
    /// A well-formed envelope whose `type` this client does not know yet.
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn decode_server_frame(raw: &str, max_frame_bytes: usize) -> Result<Inbound, FrameError> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    let value: Value = serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))?;
    let Value::Object(map) = &value else {
        return Err(FrameError::NotAnObject);
    };
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?;
    if FrameKind::from_wire(kind).is_none() {
        return Ok(Inbound::Unknown {
            kind: kind.to_string(),
        });
    }
    serde_json::from_value(value)
        .map(Inbound::Known)
        .map_err(|err| FrameError::Decode(err.to_string()))
}

pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, FrameError> {
    serde_json::to_string(frame).map_err(|err| FrameError::Encode(err.to_string()))
}
