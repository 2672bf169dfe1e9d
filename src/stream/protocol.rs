//! Wire protocol of a scan: five typed events framed as Server-Sent Events.
//!
//! Framing is `event: <name>\ndata: <json>\n\n`. The decoder side tolerates
//! CRLF line endings, comment lines (keep-alives), multi-line `data:` fields
//! and frames split across arbitrary chunk boundaries.

use serde::{Deserialize, Serialize};

use crate::classify::ClassificationResult;
use crate::ingest::types::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetching,
    Ranking,
    Analyzing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub phase: Phase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlesPayload {
    pub articles: Vec<Item>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedPayload {
    pub article: Item,
    pub analysis: ClassificationResult,
    pub progress: Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Status(StatusPayload),
    Articles(ArticlesPayload),
    Analyzed(Box<AnalyzedPayload>),
    Complete(CompletePayload),
    Error(ErrorPayload),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("bad '{event}' payload: {source}")]
    BadPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ScanEvent {
    pub const STATUS: &'static str = "status";
    pub const ARTICLES: &'static str = "articles";
    pub const ANALYZED: &'static str = "analyzed";
    pub const COMPLETE: &'static str = "complete";
    pub const ERROR: &'static str = "error";

    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::Status(_) => Self::STATUS,
            ScanEvent::Articles(_) => Self::ARTICLES,
            ScanEvent::Analyzed(_) => Self::ANALYZED,
            ScanEvent::Complete(_) => Self::COMPLETE,
            ScanEvent::Error(_) => Self::ERROR,
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanEvent::Complete(_) | ScanEvent::Error(_))
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScanEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// JSON body of the `data:` field.
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            ScanEvent::Status(p) => serde_json::to_string(p),
            ScanEvent::Articles(p) => serde_json::to_string(p),
            ScanEvent::Analyzed(p) => serde_json::to_string(p),
            ScanEvent::Complete(p) => serde_json::to_string(p),
            ScanEvent::Error(p) => serde_json::to_string(p),
        }
    }

    /// Full SSE frame, terminated by the blank line.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), self.data_json()?))
    }

    pub fn from_parts(event: &str, data: &str) -> Result<Self, ProtocolError> {
        let bad = |source| ProtocolError::BadPayload {
            event: event.to_string(),
            source,
        };
        Ok(match event {
            Self::STATUS => ScanEvent::Status(serde_json::from_str(data).map_err(bad)?),
            Self::ARTICLES => ScanEvent::Articles(serde_json::from_str(data).map_err(bad)?),
            Self::ANALYZED => ScanEvent::Analyzed(Box::new(serde_json::from_str(data).map_err(bad)?)),
            Self::COMPLETE => ScanEvent::Complete(serde_json::from_str(data).map_err(bad)?),
            Self::ERROR => ScanEvent::Error(serde_json::from_str(data).map_err(bad)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        })
    }
}

/// One raw SSE frame. `event` defaults to "message" when the frame has no `event:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn decode(&self) -> Result<ScanEvent, ProtocolError> {
        ScanEvent::from_parts(&self.event, &self.data)
    }
}

/// Incremental SSE frame splitter. Feed raw bytes, get complete frames back.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buf.drain(..pos + 2).collect();
            // A frame always ends on a newline, so it never splits a UTF-8 sequence.
            let text = String::from_utf8_lossy(&raw[..pos]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes received that do not yet form a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

fn parse_frame(text: &str) -> Option<Frame> {
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            // id / retry and unknown fields carry nothing we use
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(Frame {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}
