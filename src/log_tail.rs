// Live log producer: splits runtime chunks into lines and forwards them with lossy backpressure

use crate::config::LogsConfig;
use crate::docker_repo::{ContainerRuntime, LogChunkStream};
use crate::error::StreamFault;
use crate::models::{EndCause, StreamMessage};
use crate::session::{SendOutcome, SessionContext};
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Size of the multiplexed stream frame header (stream byte, 3 padding, 4 length).
pub const MUX_HEADER_LEN: usize = 8;

/// Strip the multiplex header from a line whose first byte marks stdout (1) or stderr (2).
pub fn demux_line(line: &[u8]) -> &[u8] {
    if line.len() > MUX_HEADER_LEN && matches!(line[0], 1 | 2) {
        &line[MUX_HEADER_LEN..]
    } else {
        line
    }
}

fn sanitize(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(demux_line(line)).into_owned()
}

/// Reassembles newline-terminated lines from arbitrarily split chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feed a chunk; returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            if self.pending.is_empty() {
                lines.push(sanitize(&rest[..pos]));
            } else {
                self.pending.extend_from_slice(&rest[..pos]);
                lines.push(sanitize(&self.pending));
                self.pending.clear();
            }
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Flush an unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = sanitize(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

enum Exit {
    Cancelled,
    Detached,
    Ended(EndCause),
}

/// Owns one container's followed log stream for the lifetime of one session.
pub(crate) struct LogTailSession {
    ctx: SessionContext,
    stream: LogChunkStream,
    send_timeout: Duration,
    dropped_lines_total: Arc<AtomicU64>,
}

impl LogTailSession {
    /// Open the followed log stream. Callers check the container is running first.
    pub(crate) fn open<R: ContainerRuntime>(
        runtime: &R,
        ctx: SessionContext,
        config: &LogsConfig,
        dropped_lines_total: Arc<AtomicU64>,
    ) -> Self {
        let stream = runtime.log_stream(&ctx.container_id, &config.tail);
        Self {
            ctx,
            stream,
            send_timeout: config.send_timeout(),
            dropped_lines_total,
        }
    }

    pub(crate) async fn run(self) {
        let Self {
            ctx,
            mut stream,
            send_timeout,
            dropped_lines_total,
        } = self;
        ctx.mark_active();
        tracing::info!(container_id = %ctx.container_id, "Log tail started");

        let mut dropped = 0u64;
        let exit = pump(&ctx, &mut stream, send_timeout, &mut dropped).await;
        drop(stream);
        dropped_lines_total.fetch_add(dropped, Ordering::Relaxed);

        let container_id = ctx.container_id.clone();
        match exit {
            Exit::Cancelled | Exit::Detached => {
                tracing::debug!(container_id = %container_id, dropped_lines = dropped, "Log tail stopped");
            }
            Exit::Ended(cause) => {
                if let EndCause::Transport(e) = &cause {
                    tracing::warn!(container_id = %container_id, error = %e, "Log stream failed");
                    let line = StreamMessage::LogLineReceived {
                        container_id: container_id.clone(),
                        text: format!("ERROR: {}", e),
                    };
                    if ctx.send_within(line, send_timeout).await == SendOutcome::Dropped {
                        dropped_lines_total.fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    tracing::info!(container_id = %container_id, dropped_lines = dropped, "Log stream ended");
                }
                ctx.send(StreamMessage::StreamEnded {
                    container_id,
                    kind: ctx.kind,
                    cause,
                })
                .await;
            }
        }
        ctx.mark_idle();
    }
}

async fn pump(
    ctx: &SessionContext,
    stream: &mut LogChunkStream,
    send_timeout: Duration,
    dropped: &mut u64,
) -> Exit {
    let mut splitter = LineSplitter::default();
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Exit::Cancelled,
            item = stream.next() => item,
        };
        let lines = match item {
            Some(Ok(chunk)) => splitter.push(&chunk),
            Some(Err(StreamFault::Decode(e))) => {
                tracing::debug!(container_id = %ctx.container_id, error = %e, "Skipping undecodable log frame");
                continue;
            }
            Some(Err(StreamFault::Transport(e))) => return Exit::Ended(EndCause::Transport(e)),
            None => {
                if let Some(last) = splitter.finish()
                    && let Some(exit) = forward(ctx, last, send_timeout, dropped).await
                {
                    return exit;
                }
                return Exit::Ended(EndCause::EndOfStream);
            }
        };
        for line in lines {
            if let Some(exit) = forward(ctx, line, send_timeout, dropped).await {
                return exit;
            }
        }
    }
}

/// Queue one line; `Some` means the session must stop.
async fn forward(
    ctx: &SessionContext,
    text: String,
    send_timeout: Duration,
    dropped: &mut u64,
) -> Option<Exit> {
    let msg = StreamMessage::LogLineReceived {
        container_id: ctx.container_id.clone(),
        text,
    };
    match ctx.send_within(msg, send_timeout).await {
        SendOutcome::Sent => None,
        SendOutcome::Dropped => {
            *dropped += 1;
            tracing::debug!(container_id = %ctx.container_id, "Log queue full, dropping line");
            None
        }
        SendOutcome::Cancelled => Some(Exit::Cancelled),
        SendOutcome::Closed => Some(Exit::Detached),
    }
}
