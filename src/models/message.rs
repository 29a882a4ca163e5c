// Messages flowing from session tasks up to the consumer loop

use super::DerivedMetrics;
use serde::Serialize;
use std::fmt;

/// The two kinds of per-container stream a session can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Telemetry,
    LogTail,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Telemetry => f.write_str("telemetry"),
            SessionKind::LogTail => f.write_str("log-tail"),
        }
    }
}

/// Why a session stopped producing, when it was not cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum EndCause {
    /// The runtime closed the stream (usually the container stopped).
    EndOfStream,
    /// The connection failed mid-stream.
    Transport(String),
}

impl fmt::Display for EndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndCause::EndOfStream => f.write_str("stream closed by runtime"),
            EndCause::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Everything a session can tell the consumer. Cancellation produces no message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamMessage {
    #[serde(rename_all = "camelCase")]
    MetricsUpdated {
        container_id: String,
        metrics: DerivedMetrics,
    },
    #[serde(rename_all = "camelCase")]
    LogLineReceived { container_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    StreamEnded {
        container_id: String,
        kind: SessionKind,
        cause: EndCause,
    },
    #[serde(rename_all = "camelCase")]
    StreamStartFailed {
        container_id: String,
        kind: SessionKind,
        reason: String,
    },
}

impl StreamMessage {
    pub fn container_id(&self) -> &str {
        match self {
            StreamMessage::MetricsUpdated { container_id, .. }
            | StreamMessage::LogLineReceived { container_id, .. }
            | StreamMessage::StreamEnded { container_id, .. }
            | StreamMessage::StreamStartFailed { container_id, .. } => container_id,
        }
    }

    /// True for messages after which the emitting session is gone.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamMessage::StreamEnded { .. } | StreamMessage::StreamStartFailed { .. }
        )
    }
}
