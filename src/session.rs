// Plumbing shared by the telemetry and log tail producer tasks

use crate::models::{SessionKind, StreamMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one (container, kind) slot: Idle → Starting → Active → Stopping → Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Result of handing one message to the consumer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The queue stayed full for the whole timeout; the message was discarded.
    Dropped,
    Cancelled,
    /// The consumer dropped its receiver.
    Closed,
}

/// Everything a producer task owns besides its runtime stream.
///
/// The output queue sender lives here and nowhere else, so the queue closes
/// exactly once: when the task finishes and drops its context.
pub(crate) struct SessionContext {
    pub(crate) container_id: String,
    pub(crate) kind: SessionKind,
    pub(crate) cancel: CancellationToken,
    tx: mpsc::Sender<StreamMessage>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionContext {
    pub(crate) fn new(
        container_id: String,
        kind: SessionKind,
        cancel: CancellationToken,
        state: Arc<watch::Sender<SessionState>>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                container_id,
                kind,
                cancel,
                tx,
                state,
            },
            rx,
        )
    }

    /// Starting → Active. Leaves Stopping untouched if the registry got there first.
    pub(crate) fn mark_active(&self) {
        self.state.send_if_modified(|s| {
            if *s == SessionState::Starting {
                *s = SessionState::Active;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn mark_idle(&self) {
        self.state.send_replace(SessionState::Idle);
    }

    /// Wait for queue space as long as it takes; only cancellation interrupts.
    pub(crate) async fn send(&self, msg: StreamMessage) -> SendOutcome {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => SendOutcome::Cancelled,
            r = self.tx.send(msg) => match r {
                Ok(()) => SendOutcome::Sent,
                Err(_) => SendOutcome::Closed,
            },
        }
    }

    /// Wait at most `timeout` for queue space, then give the message up.
    pub(crate) async fn send_within(&self, msg: StreamMessage, timeout: Duration) -> SendOutcome {
        send_within(&self.tx, msg, timeout, &self.cancel).await
    }
}

/// Bounded, lossy send: blocks up to `timeout` on a full queue unless cancelled.
pub async fn send_within<T>(
    tx: &mpsc::Sender<T>,
    msg: T,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SendOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => SendOutcome::Cancelled,
        r = tokio::time::timeout(timeout, tx.send(msg)) => match r {
            Ok(Ok(())) => SendOutcome::Sent,
            Ok(Err(_)) => SendOutcome::Closed,
            Err(_) => SendOutcome::Dropped,
        },
    }
}
