// Consumer-side state: metric histories, the open log view and per-stream status.
// Mutated only by the consumer loop, so nothing here needs a lock.

use crate::config::AppConfig;
use crate::models::{DerivedMetrics, SessionKind, StreamMessage};
use crate::paginator::{BufferMode, LogPaginator};
use std::collections::{HashMap, VecDeque};

/// Bounded chart series for one container; newest sample last.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    capacity: usize,
    pub cpu: VecDeque<f64>,
    pub mem: VecDeque<f64>,
    pub net_rx_per_sec: VecDeque<f64>,
    pub net_tx_per_sec: VecDeque<f64>,
    pub latest: Option<DerivedMetrics>,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            cpu: VecDeque::with_capacity(capacity),
            mem: VecDeque::with_capacity(capacity),
            net_rx_per_sec: VecDeque::with_capacity(capacity),
            net_tx_per_sec: VecDeque::with_capacity(capacity),
            latest: None,
        }
    }

    pub fn push(&mut self, metrics: DerivedMetrics) {
        let cap = self.capacity;
        push_bounded(&mut self.cpu, metrics.cpu_percent, cap);
        push_bounded(&mut self.mem, metrics.mem_percent, cap);
        push_bounded(
            &mut self.net_rx_per_sec,
            metrics.net_rx_per_sec.unwrap_or(0.0),
            cap,
        );
        push_bounded(
            &mut self.net_tx_per_sec,
            metrics.net_tx_per_sec.unwrap_or(0.0),
            cap,
        );
        self.latest = Some(metrics);
    }

    pub fn len(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }
}

fn push_bounded(series: &mut VecDeque<f64>, value: f64, cap: usize) {
    if series.len() == cap {
        series.pop_front();
    }
    series.push_back(value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Streaming,
    Ended(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounters {
    pub metrics_received: u64,
    pub log_lines_received: u64,
    pub log_lines_ignored: u64,
    pub streams_ended: u64,
    pub starts_failed: u64,
}

pub struct Dashboard {
    history_len: usize,
    histories: HashMap<String, MetricsHistory>,
    status: HashMap<(String, SessionKind), StreamStatus>,
    logs: LogPaginator,
    log_container: Option<String>,
    counters: DashboardCounters,
}

impl Dashboard {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            history_len: config.telemetry.history_len,
            histories: HashMap::new(),
            status: HashMap::new(),
            logs: LogPaginator::new(config.paginator.clone()),
            log_container: None,
            counters: DashboardCounters::default(),
        }
    }

    /// Apply one upward message. Every variant is handled here and nowhere else.
    pub fn apply(&mut self, msg: StreamMessage) {
        match msg {
            StreamMessage::MetricsUpdated {
                container_id,
                metrics,
            } => {
                self.counters.metrics_received += 1;
                self.status
                    .insert((container_id.clone(), SessionKind::Telemetry), StreamStatus::Streaming);
                let history_len = self.history_len;
                self.histories
                    .entry(container_id)
                    .or_insert_with(|| MetricsHistory::new(history_len))
                    .push(metrics);
            }
            StreamMessage::LogLineReceived { container_id, text } => {
                if self.log_container.as_deref() == Some(container_id.as_str()) {
                    self.counters.log_lines_received += 1;
                    self.status
                        .insert((container_id, SessionKind::LogTail), StreamStatus::Streaming);
                    self.logs.append(text);
                } else {
                    // Late line from a view the user already left.
                    self.counters.log_lines_ignored += 1;
                }
            }
            StreamMessage::StreamEnded {
                container_id,
                kind,
                cause,
            } => {
                self.counters.streams_ended += 1;
                self.status
                    .insert((container_id, kind), StreamStatus::Ended(cause.to_string()));
            }
            StreamMessage::StreamStartFailed {
                container_id,
                kind,
                reason,
            } => {
                self.counters.starts_failed += 1;
                self.status
                    .insert((container_id, kind), StreamStatus::Failed(reason));
            }
        }
    }

    /// Point the log view at a container's live tail; clears the previous view.
    pub fn open_live_logs(&mut self, container_id: &str) {
        self.log_container = Some(container_id.to_string());
        self.logs.set_mode(BufferMode::Streaming);
    }

    /// Show a static snapshot of a container's logs.
    pub fn load_log_snapshot(&mut self, container_id: &str, lines: Vec<String>) {
        self.log_container = Some(container_id.to_string());
        self.logs.load_static(lines);
    }

    /// Forget the log view (navigating away from a container).
    pub fn close_logs(&mut self, container_id: &str) {
        if self.log_container.as_deref() == Some(container_id) {
            self.log_container = None;
            self.logs.clear();
        }
    }

    pub fn history(&self, container_id: &str) -> Option<&MetricsHistory> {
        self.histories.get(container_id)
    }

    pub fn status(&self, container_id: &str, kind: SessionKind) -> Option<&StreamStatus> {
        self.status.get(&(container_id.to_string(), kind))
    }

    pub fn logs(&self) -> &LogPaginator {
        &self.logs
    }

    pub fn logs_mut(&mut self) -> &mut LogPaginator {
        &mut self.logs
    }

    pub fn log_container(&self) -> Option<&str> {
        self.log_container.as_deref()
    }

    pub fn counters(&self) -> DashboardCounters {
        self.counters
    }

    pub fn tracked_containers(&self) -> usize {
        self.histories.len()
    }
}
