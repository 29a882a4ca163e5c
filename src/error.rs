// Error types for the container runtime and the streaming sessions

use crate::models::{ContainerState, SessionKind, StreamMessage};

/// One-shot container runtime call failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime has no container with this id (404).
    #[error("container not found: {0}")]
    NotFound(String),

    /// The runtime could not be reached or answered with an error.
    #[error("docker api error: {0}")]
    Api(String),
}

/// A failed item inside a live stats or log stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFault {
    /// The payload could not be decoded; the stream itself is still usable.
    #[error("decode error: {0}")]
    Decode(String),

    /// The connection failed; no further items will arrive.
    #[error("{0}")]
    Transport(String),
}

/// Reasons a session could not be started.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
    /// Log tailing only makes sense for a live process.
    #[error("container {container_id} is {state}, not running")]
    NotRunning {
        container_id: String,
        state: ContainerState,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl StartError {
    /// The upward message the consumer sees for this failure.
    pub fn into_message(self, container_id: &str, kind: SessionKind) -> StreamMessage {
        StreamMessage::StreamStartFailed {
            container_id: container_id.to_string(),
            kind,
            reason: self.to_string(),
        }
    }
}
