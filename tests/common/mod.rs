// Shared test helpers: a scripted in-memory container runtime

#![allow(dead_code)]

use bytes::Bytes;
use dockwatch::config::AppConfig;
use dockwatch::docker_repo::{ContainerRuntime, LogChunkStream, SnapshotStream};
use dockwatch::error::{RuntimeError, StreamFault};
use dockwatch::models::{ContainerState, CpuSample, RawSnapshot, StreamMessage};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type StatsFeed = mpsc::UnboundedSender<Result<RawSnapshot, StreamFault>>;
pub type LogFeed = mpsc::UnboundedSender<Result<Bytes, StreamFault>>;

#[derive(Default)]
struct Inner {
    states: HashMap<String, ContainerState>,
    unreachable: bool,
    stats_feeds: HashMap<String, StatsFeed>,
    log_feeds: HashMap<String, LogFeed>,
    snapshots: HashMap<String, Vec<String>>,
    opened: u64,
    close_delay: Option<Duration>,
}

/// Records "open:<kind>:<id>#<n>" / "close:<kind>:<id>#<n>" as streams come and go.
#[derive(Clone, Default)]
pub struct MockRuntime {
    inner: Arc<Mutex<Inner>>,
    events: Arc<Mutex<Vec<String>>>,
}

struct CloseRecorder {
    events: Arc<Mutex<Vec<String>>>,
    label: String,
    delay: Option<Duration>,
}

impl Drop for CloseRecorder {
    fn drop(&mut self) {
        // Blocks the dropping thread, like a connection that is slow to tear down.
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(format!("close:{}", self.label));
        }
    }
}

fn tracked<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
    recorder: CloseRecorder,
) -> BoxStream<'static, T> {
    futures_util::stream::unfold((rx, recorder), |(mut rx, recorder)| async move {
        rx.recv().await.map(|item| (item, (rx, recorder)))
    })
    .boxed()
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, id: &str, state: ContainerState) -> Self {
        self.set_state(id, state);
        self
    }

    pub fn set_state(&self, id: &str, state: ContainerState) {
        self.inner.lock().unwrap().states.insert(id.to_string(), state);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }

    /// Make every stream opened from now on block for `delay` when dropped.
    pub fn set_close_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().close_delay = Some(delay);
    }

    pub fn set_log_snapshot(&self, id: &str, lines: &[&str]) {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .insert(id.to_string(), lines.iter().map(|l| l.to_string()).collect());
    }

    /// Take the feed of the most recently opened stats stream; dropping it ends the stream.
    pub fn take_stats_feed(&self, id: &str) -> Option<StatsFeed> {
        self.inner.lock().unwrap().stats_feeds.remove(id)
    }

    pub fn take_log_feed(&self, id: &str) -> Option<LogFeed> {
        self.inner.lock().unwrap().log_feeds.remove(id)
    }

    /// Poll until a stats stream for `id` has been opened.
    pub async fn wait_stats_feed(&self, id: &str) -> StatsFeed {
        for _ in 0..500 {
            if let Some(feed) = self.take_stats_feed(id) {
                return feed;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("stats stream for {id} never opened");
    }

    pub async fn wait_log_feed(&self, id: &str) -> LogFeed {
        for _ in 0..500 {
            if let Some(feed) = self.take_log_feed(id) {
                return feed;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log stream for {id} never opened");
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_events(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Poll until `pred` holds over the recorded events.
    pub async fn wait_events(&self, pred: impl Fn(&[String]) -> bool) {
        for _ in 0..500 {
            if pred(&self.events()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never met; events: {:?}", self.events());
    }

    fn open(&self, kind: &str, id: &str) -> CloseRecorder {
        let (n, delay) = {
            let mut inner = self.inner.lock().unwrap();
            inner.opened += 1;
            (inner.opened, inner.close_delay)
        };
        let label = format!("{kind}:{id}#{n}");
        self.events.lock().unwrap().push(format!("open:{label}"));
        CloseRecorder {
            events: self.events.clone(),
            label,
            delay,
        }
    }
}

impl ContainerRuntime for MockRuntime {
    async fn container_state(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let inner = self.inner.lock().unwrap();
        if inner.unreachable {
            return Err(RuntimeError::Api("connection refused".into()));
        }
        inner
            .states
            .get(id)
            .copied()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    fn stats_stream(&self, id: &str) -> SnapshotStream {
        let recorder = self.open("stats", id);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .stats_feeds
            .insert(id.to_string(), tx);
        tracked(rx, recorder)
    }

    fn log_stream(&self, id: &str, _tail: &str) -> LogChunkStream {
        let recorder = self.open("logs", id);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().log_feeds.insert(id.to_string(), tx);
        tracked(rx, recorder)
    }

    async fn log_snapshot(&self, id: &str, _tail: &str) -> Result<Vec<String>, RuntimeError> {
        self.inner
            .lock()
            .unwrap()
            .snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }
}

pub fn snapshot(total_usage: u64, system_usage: u64, cores: usize) -> RawSnapshot {
    RawSnapshot {
        cpu: CpuSample {
            total_usage,
            per_core_usage: vec![total_usage / cores.max(1) as u64; cores],
            system_usage,
        },
        ..Default::default()
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.registry.stop_timeout_ms = 2000;
    config
}

/// Receive the next message or fail after five seconds.
pub async fn next_message(rx: &mut mpsc::Receiver<StreamMessage>) -> Option<StreamMessage> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session message")
}

pub fn mux_frame(stream: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![stream, 0, 0, 0];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
