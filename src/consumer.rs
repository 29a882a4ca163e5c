// The consumer loop: the single task that owns the registry and the dashboard.
// Session output queues are merged into one inbox; commands arrive on a channel.

use crate::config::AppConfig;
use crate::dashboard::Dashboard;
use crate::docker_repo::ContainerRuntime;
use crate::models::{SessionKind, StreamMessage};
use crate::paginator::PageNav;
use crate::registry::SessionRegistry;
use futures_util::StreamExt;
use futures_util::stream::{AbortHandle, BoxStream, SelectAll, abortable};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};

/// What the input side (keybindings, CLI) asks the consumer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a container view: live telemetry and live logs. Leaves the previous view.
    Focus(String),
    /// (Re)open the live log tail of a container.
    OpenLogs(String),
    /// Replace the log view with a static snapshot of recent lines.
    LoadLogSnapshot(String),
    /// Leave a container view, stopping all of its sessions.
    NavigateAway(String),
    Page(PageNav),
    Shutdown,
}

/// Commands channel capacity; input is human-paced.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

type Inbox = SelectAll<BoxStream<'static, StreamMessage>>;

fn into_stream(rx: mpsc::Receiver<StreamMessage>) -> BoxStream<'static, StreamMessage> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|msg| (msg, rx))
    })
    .boxed()
}

struct Consumer<R> {
    registry: SessionRegistry<R>,
    dashboard: Dashboard,
    inbox: Inbox,
    /// Abort handle of the inbox stream of each installed session.
    feeds: HashMap<(String, SessionKind), AbortHandle>,
    focused: Option<String>,
    snapshot_tail: String,
}

impl<R: ContainerRuntime> Consumer<R> {
    async fn start(&mut self, container_id: &str, kind: SessionKind) {
        self.detach(container_id, kind);
        match self.registry.start(container_id, kind).await {
            Ok(rx) => {
                let (stream, handle) = abortable(into_stream(rx));
                self.feeds.insert((container_id.to_string(), kind), handle);
                self.inbox.push(stream.boxed());
            }
            Err(e) => self.dashboard.apply(e.into_message(container_id, kind)),
        }
    }

    async fn stop(&mut self, container_id: &str, kind: SessionKind) {
        self.detach(container_id, kind);
        self.registry.stop(container_id, kind).await;
    }

    /// Stop delivering a session's messages, including any it already queued.
    /// The aborted stream ends on its next poll and `SelectAll` drops it.
    fn detach(&mut self, container_id: &str, kind: SessionKind) {
        if let Some(handle) = self.feeds.remove(&(container_id.to_string(), kind)) {
            handle.abort();
        }
    }

    async fn handle(&mut self, command: Command) {
        tracing::debug!(?command, "Consumer command");
        match command {
            Command::Focus(id) => {
                if let Some(prev) = self.focused.take()
                    && prev != id
                {
                    self.leave(&prev).await;
                }
                self.focused = Some(id.clone());
                self.start(&id, SessionKind::Telemetry).await;
                self.dashboard.open_live_logs(&id);
                self.start(&id, SessionKind::LogTail).await;
            }
            Command::OpenLogs(id) => {
                self.dashboard.open_live_logs(&id);
                self.start(&id, SessionKind::LogTail).await;
            }
            Command::LoadLogSnapshot(id) => {
                self.stop(&id, SessionKind::LogTail).await;
                match self
                    .registry
                    .runtime()
                    .log_snapshot(&id, &self.snapshot_tail)
                    .await
                {
                    Ok(lines) => self.dashboard.load_log_snapshot(&id, lines),
                    Err(e) => {
                        tracing::warn!(container_id = %id, error = %e, "Log snapshot failed");
                        self.dashboard.apply(StreamMessage::StreamStartFailed {
                            container_id: id,
                            kind: SessionKind::LogTail,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Command::NavigateAway(id) => {
                if self.focused.as_deref() == Some(id.as_str()) {
                    self.focused = None;
                }
                self.leave(&id).await;
            }
            Command::Page(nav) => self.dashboard.logs_mut().navigate(nav),
            Command::Shutdown => {}
        }
    }

    async fn leave(&mut self, container_id: &str) {
        self.detach(container_id, SessionKind::Telemetry);
        self.detach(container_id, SessionKind::LogTail);
        self.registry.stop_all(container_id).await;
        self.dashboard.close_logs(container_id);
    }

    fn receive(&mut self, msg: StreamMessage) {
        let terminal = msg.is_terminal();
        self.dashboard.apply(msg);
        if terminal {
            let reaped = self.registry.reap_finished();
            tracing::debug!(reaped, "Reaped finished sessions");
        }
    }

    fn log_stats(&self) {
        let counters = self.dashboard.counters();
        let latest = self
            .focused
            .as_deref()
            .and_then(|id| self.dashboard.history(id))
            .and_then(|h| h.latest.as_ref());
        tracing::info!(
            focused = self.focused.as_deref().unwrap_or("-"),
            active_sessions = self.registry.active_sessions(),
            tracked_containers = self.dashboard.tracked_containers(),
            metrics_received = counters.metrics_received,
            log_lines_received = counters.log_lines_received,
            log_lines_dropped = self.registry.dropped_lines_total(),
            cpu_percent = latest.map(|m| m.cpu_percent),
            mem_percent = latest.map(|m| m.mem_percent),
            "dashboard stats"
        );
    }
}

/// Run the consumer until `Shutdown` or until every command sender is gone.
/// All sessions are stopped before the dashboard is handed back.
pub async fn run<R: ContainerRuntime>(
    registry: SessionRegistry<R>,
    dashboard: Dashboard,
    mut commands: mpsc::Receiver<Command>,
    config: &AppConfig,
) -> Dashboard {
    let mut consumer = Consumer {
        registry,
        dashboard,
        inbox: SelectAll::new(),
        feeds: HashMap::new(),
        focused: None,
        snapshot_tail: config.logs.snapshot_tail.clone(),
    };
    let mut stats_tick = interval(Duration::from_secs(
        config.monitoring.stats_log_interval_secs,
    ));
    stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; nothing to report yet.
    stats_tick.tick().await;

    loop {
        tokio::select! {
            Some(msg) = consumer.inbox.next(), if !consumer.inbox.is_empty() => {
                consumer.receive(msg);
            }
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => consumer.handle(command).await,
            },
            _ = stats_tick.tick() => consumer.log_stats(),
        }
    }

    tracing::debug!("Consumer shutting down");
    consumer.registry.shutdown_all().await;
    consumer.dashboard
}

/// Spawn the consumer loop on its own task.
pub fn spawn<R: ContainerRuntime>(
    registry: SessionRegistry<R>,
    dashboard: Dashboard,
    commands: mpsc::Receiver<Command>,
    config: AppConfig,
) -> tokio::task::JoinHandle<Dashboard> {
    tokio::spawn(async move { run(registry, dashboard, commands, &config).await })
}
