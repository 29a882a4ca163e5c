use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker: DockerConfig,
    pub telemetry: TelemetryConfig,
    pub logs: LogsConfig,
    pub paginator: PaginatorConfig,
    pub registry: RegistryConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Unix socket path; empty means bollard's unix defaults (DOCKER_HOST or /var/run/docker.sock).
    pub socket_path: String,
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: String::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Output queue capacity of each telemetry session.
    pub queue_capacity: usize,
    /// Number of samples kept per container for charts.
    pub history_len: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            history_len: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Output queue capacity of each log tail session.
    pub queue_capacity: usize,
    /// How long a producer waits on a full queue before dropping the line.
    pub send_timeout_ms: u64,
    /// Lines of history requested when a live tail opens ("all" or a count).
    pub tail: String,
    /// Lines requested for a static snapshot load.
    pub snapshot_tail: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50,
            send_timeout_ms: 1000,
            tail: "100".into(),
            snapshot_tail: "500".into(),
        }
    }
}

impl LogsConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    pub streaming_capacity: usize,
    pub streaming_page_size: usize,
    pub static_page_size: usize,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            streaming_capacity: crate::paginator::STREAMING_CAPACITY,
            streaming_page_size: crate::paginator::STREAMING_PAGE_SIZE,
            static_page_size: crate::paginator::STATIC_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Grace period for a cancelled session task before it is aborted.
    pub stop_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 5000,
        }
    }
}

impl RegistryConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How often to log dashboard stats (sessions, messages, dropped lines) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load from `CONFIG_FILE` (default `config.toml`). A missing default file yields defaults;
    /// a missing file named explicitly by `CONFIG_FILE` is an error.
    pub fn load() -> anyhow::Result<Self> {
        let (path, explicit) = match std::env::var("CONFIG_FILE") {
            Ok(p) => (p, true),
            Err(_) => ("config.toml".to_string(), false),
        };
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No {} found, using default configuration", path);
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("reading {}: {}", path, e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.docker.timeout_secs > 0,
            "docker.timeout_secs must be > 0, got {}",
            self.docker.timeout_secs
        );
        anyhow::ensure!(
            self.telemetry.queue_capacity > 0,
            "telemetry.queue_capacity must be > 0, got {}",
            self.telemetry.queue_capacity
        );
        anyhow::ensure!(
            self.telemetry.history_len > 0,
            "telemetry.history_len must be > 0, got {}",
            self.telemetry.history_len
        );
        anyhow::ensure!(
            self.logs.queue_capacity > 0,
            "logs.queue_capacity must be > 0, got {}",
            self.logs.queue_capacity
        );
        anyhow::ensure!(
            self.logs.send_timeout_ms > 0,
            "logs.send_timeout_ms must be > 0, got {}",
            self.logs.send_timeout_ms
        );
        anyhow::ensure!(
            is_valid_tail(&self.logs.tail),
            "logs.tail must be \"all\" or a line count, got {:?}",
            self.logs.tail
        );
        anyhow::ensure!(
            is_valid_tail(&self.logs.snapshot_tail),
            "logs.snapshot_tail must be \"all\" or a line count, got {:?}",
            self.logs.snapshot_tail
        );
        anyhow::ensure!(
            self.paginator.streaming_capacity > 0,
            "paginator.streaming_capacity must be > 0, got {}",
            self.paginator.streaming_capacity
        );
        anyhow::ensure!(
            self.paginator.streaming_page_size > 0,
            "paginator.streaming_page_size must be > 0, got {}",
            self.paginator.streaming_page_size
        );
        anyhow::ensure!(
            self.paginator.static_page_size > 0,
            "paginator.static_page_size must be > 0, got {}",
            self.paginator.static_page_size
        );
        anyhow::ensure!(
            self.registry.stop_timeout_ms > 0,
            "registry.stop_timeout_ms must be > 0, got {}",
            self.registry.stop_timeout_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}

fn is_valid_tail(tail: &str) -> bool {
    tail == "all" || tail.parse::<u64>().is_ok()
}
