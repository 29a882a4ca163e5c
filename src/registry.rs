// Session registry: sole owner of running sessions, at most one per (container, kind)

use crate::config::{AppConfig, LogsConfig, TelemetryConfig};
use crate::docker_repo::ContainerRuntime;
use crate::error::StartError;
use crate::log_tail::LogTailSession;
use crate::models::{SessionKind, StreamMessage};
use crate::session::SessionContext;
use crate::telemetry_session::TelemetrySession;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use crate::session::SessionState;

type SessionKey = (String, SessionKind);

struct SessionHandle {
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn state(&self) -> SessionState {
        if self.task.is_finished() {
            SessionState::Idle
        } else {
            *self.state.borrow()
        }
    }
}

/// Starting a session for an occupied key stops the old one first (cancel, then
/// wait for its task). The consumer only ever gets the receiving half of a queue.
pub struct SessionRegistry<R> {
    runtime: Arc<R>,
    telemetry: TelemetryConfig,
    logs: LogsConfig,
    stop_timeout: Duration,
    sessions: HashMap<SessionKey, SessionHandle>,
    dropped_lines_total: Arc<AtomicU64>,
}

impl<R: ContainerRuntime> SessionRegistry<R> {
    pub fn new(runtime: Arc<R>, config: &AppConfig) -> Self {
        Self {
            runtime,
            telemetry: config.telemetry.clone(),
            logs: config.logs.clone(),
            stop_timeout: config.registry.stop_timeout(),
            sessions: HashMap::new(),
            dropped_lines_total: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Start a session, replacing any existing one for the same container and kind.
    ///
    /// On success the caller gets the receiving end of the session's output queue.
    /// On failure no session is installed and the key is left Idle.
    pub async fn start(
        &mut self,
        container_id: &str,
        kind: SessionKind,
    ) -> Result<mpsc::Receiver<StreamMessage>, StartError> {
        self.stop(container_id, kind).await;

        let state = self
            .runtime
            .container_state(container_id)
            .await
            .inspect_err(|e| {
                tracing::warn!(container_id, %kind, error = %e, "Session start failed");
            })?;
        if kind == SessionKind::LogTail && !state.is_running() {
            tracing::info!(container_id, %kind, %state, "Not tailing logs of a stopped container");
            return Err(StartError::NotRunning {
                container_id: container_id.to_string(),
                state,
            });
        }

        let cancel = CancellationToken::new();
        let state_tx = Arc::new(watch::channel(SessionState::Starting).0);
        let capacity = match kind {
            SessionKind::Telemetry => self.telemetry.queue_capacity,
            SessionKind::LogTail => self.logs.queue_capacity,
        };
        let (ctx, rx) = SessionContext::new(
            container_id.to_string(),
            kind,
            cancel.clone(),
            state_tx.clone(),
            capacity,
        );
        let task = match kind {
            SessionKind::Telemetry => {
                tokio::spawn(TelemetrySession::open(self.runtime.as_ref(), ctx).run())
            }
            SessionKind::LogTail => tokio::spawn(
                LogTailSession::open(
                    self.runtime.as_ref(),
                    ctx,
                    &self.logs,
                    self.dropped_lines_total.clone(),
                )
                .run(),
            ),
        };
        tracing::debug!(container_id, %kind, "Session installed");
        self.sessions.insert(
            (container_id.to_string(), kind),
            SessionHandle {
                cancel,
                state: state_tx,
                task,
            },
        );
        Ok(rx)
    }

    /// Stop one session and wait for its task. No-op when nothing is running.
    pub async fn stop(&mut self, container_id: &str, kind: SessionKind) {
        if let Some(handle) = self.sessions.remove(&(container_id.to_string(), kind)) {
            self.shutdown(container_id, kind, handle).await;
        }
    }

    /// Stop every session of one container (leaving a container-scoped view).
    pub async fn stop_all(&mut self, container_id: &str) {
        for kind in [SessionKind::Telemetry, SessionKind::LogTail] {
            self.stop(container_id, kind).await;
        }
    }

    /// Stop everything (application shutdown).
    pub async fn shutdown_all(&mut self) {
        let handles: Vec<(SessionKey, SessionHandle)> = self.sessions.drain().collect();
        for ((container_id, kind), handle) in handles {
            self.shutdown(&container_id, kind, handle).await;
        }
    }

    /// Forget sessions whose task already finished (stream ended or start failed).
    pub fn reap_finished(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, h| !h.task.is_finished());
        before - self.sessions.len()
    }

    pub fn state(&self, container_id: &str, kind: SessionKind) -> SessionState {
        self.sessions
            .get(&(container_id.to_string(), kind))
            .map_or(SessionState::Idle, SessionHandle::state)
    }

    /// Sessions installed and not yet finished.
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .values()
            .filter(|h| !h.task.is_finished())
            .count()
    }

    /// Log lines dropped on full queues, across all finished log tail sessions.
    pub fn dropped_lines_total(&self) -> u64 {
        self.dropped_lines_total.load(Ordering::Relaxed)
    }

    async fn shutdown(&self, container_id: &str, kind: SessionKind, mut handle: SessionHandle) {
        if handle.task.is_finished() {
            return;
        }
        handle.state.send_replace(SessionState::Stopping);
        handle.cancel.cancel();
        match tokio::time::timeout(self.stop_timeout, &mut handle.task).await {
            Ok(Ok(())) => {
                tracing::debug!(container_id, %kind, "Session stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(container_id, %kind, error = %e, "Session task failed");
            }
            Err(_) => {
                tracing::warn!(
                    container_id,
                    %kind,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Session did not stop in time, aborting"
                );
                handle.task.abort();
            }
        }
        handle.state.send_replace(SessionState::Idle);
    }
}

impl<R> Drop for SessionRegistry<R> {
    fn drop(&mut self) {
        for handle in self.sessions.values() {
            handle.cancel.cancel();
        }
    }
}
