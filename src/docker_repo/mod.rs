// Container runtime access: the ContainerRuntime seam and its bollard implementation

mod stats;

pub use stats::raw_snapshot;

use crate::config::DockerConfig;
use crate::error::{RuntimeError, StreamFault};
use crate::log_tail::LineSplitter;
use crate::models::{ContainerState, RawSnapshot};
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{InspectContainerOptions, LogsOptions, StatsOptions};
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::future::Future;
use tracing::instrument;

/// Live stats payloads, one item per runtime emission.
pub type SnapshotStream = BoxStream<'static, Result<RawSnapshot, StreamFault>>;

/// Live log output as raw chunks; chunk boundaries need not align with lines.
pub type LogChunkStream = BoxStream<'static, Result<Bytes, StreamFault>>;

/// The container runtime operations the streaming engine depends on.
///
/// Streams are returned already opened (or lazily opening) and own their
/// connection; dropping a stream releases it.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Current lifecycle state of a container.
    fn container_state(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerState, RuntimeError>> + Send;

    /// Continuous stats for a container.
    fn stats_stream(&self, id: &str) -> SnapshotStream;

    /// Followed stdout+stderr for a container, starting with the last `tail` lines.
    fn log_stream(&self, id: &str, tail: &str) -> LogChunkStream;

    /// The last `tail` log lines without following.
    fn log_snapshot(
        &self,
        id: &str,
        tail: &str,
    ) -> impl Future<Output = Result<Vec<String>, RuntimeError>> + Send;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Connect using bollard's unix defaults (honours DOCKER_HOST).
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }

    pub fn connect_with_config(config: &DockerConfig) -> anyhow::Result<Self> {
        if config.socket_path.is_empty() {
            return Self::connect();
        }
        let docker = Docker::connect_with_unix(
            &config.socket_path,
            config.timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )?;
        Ok(Self { docker })
    }
}

impl ContainerRuntime for DockerRepo {
    #[instrument(skip(self), fields(repo = "docker", operation = "container_state"))]
    async fn container_state(&self, id: &str) -> Result<ContainerState, RuntimeError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| api_error(id, e))?;

        let state = details.state.as_ref();
        if state.and_then(|s| s.running) == Some(true) {
            return Ok(ContainerState::Running);
        }
        Ok(state
            .and_then(|s| s.status.as_ref())
            .map(|s| ContainerState::from_docker(&s.to_string()))
            .unwrap_or(ContainerState::Unknown))
    }

    fn stats_stream(&self, id: &str) -> SnapshotStream {
        let options = StatsOptions {
            stream: true,
            ..Default::default()
        };
        self.docker
            .stats(id, Some(options))
            .map(|result| match result {
                Ok(s) => raw_snapshot(&s)
                    .ok_or_else(|| StreamFault::Decode("stats payload without cpu_stats".into())),
                Err(e) => Err(stream_fault(e)),
            })
            .boxed()
    }

    fn log_stream(&self, id: &str, tail: &str) -> LogChunkStream {
        let options = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        self.docker
            .logs(id, Some(options))
            .map(|result| match result {
                Ok(output) => Ok(output.into_bytes()),
                Err(e) => Err(stream_fault(e)),
            })
            .boxed()
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "log_snapshot"))]
    async fn log_snapshot(&self, id: &str, tail: &str) -> Result<Vec<String>, RuntimeError> {
        let options = LogsOptions {
            follow: false,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker.logs(id, Some(options)));
        let mut splitter = LineSplitter::default();
        let mut lines = Vec::new();
        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => lines.extend(splitter.push(&output.into_bytes())),
                Err(e) if is_decode_error(&e) => {
                    tracing::debug!(error = %e, "skipping undecodable log frame")
                }
                Err(e) => return Err(api_error(id, e)),
            }
        }
        lines.extend(splitter.finish());
        Ok(lines)
    }
}

fn api_error(id: &str, e: BollardError) -> RuntimeError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(id.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

/// Decode failures leave the stream usable; everything else ends it.
fn stream_fault(e: BollardError) -> StreamFault {
    if is_decode_error(&e) {
        StreamFault::Decode(e.to_string())
    } else {
        StreamFault::Transport(e.to_string())
    }
}

fn is_decode_error(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::JsonDataError { .. } | BollardError::JsonSerdeError { .. }
    )
}
