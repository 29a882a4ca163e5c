// Live stats producer: one task per container turning snapshot pairs into DerivedMetrics

use crate::docker_repo::{ContainerRuntime, SnapshotStream};
use crate::error::StreamFault;
use crate::models::{DerivedMetrics, EndCause, RawSnapshot, StreamMessage};
use crate::session::{SendOutcome, SessionContext};
use futures_util::StreamExt;

/// Clamp into [0, 100]; anything non-finite becomes 0.
fn clamp_percent(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 }
}

/// CPU utilisation for one counter pair.
///
/// A zero system delta (duplicate or too-fast tick) falls back to
/// `cpu_delta * cores * 100`; a negative one means the host counter was reset
/// and yields 0.
pub fn cpu_percent(cpu_delta: f64, sys_delta: f64, num_cores: usize) -> f64 {
    let cores = num_cores.max(1) as f64;
    let raw = if sys_delta > 0.0 {
        (cpu_delta * cores * 100.0) / sys_delta
    } else if sys_delta == 0.0 {
        cpu_delta * cores * 100.0
    } else {
        0.0
    };
    clamp_percent(raw)
}

/// Derive metrics from a snapshot and the one immediately before it.
pub fn derive_metrics(prev: &RawSnapshot, curr: &RawSnapshot) -> DerivedMetrics {
    let cpu_delta = curr.cpu.total_usage as f64 - prev.cpu.total_usage as f64;
    let sys_delta = curr.cpu.system_usage as f64 - prev.cpu.system_usage as f64;
    let num_cores = curr.cpu.per_core_usage.len().max(1);

    let per_core_percent = (!curr.cpu.per_core_usage.is_empty()
        && curr.cpu.per_core_usage.len() == prev.cpu.per_core_usage.len())
    .then(|| {
        curr.cpu
            .per_core_usage
            .iter()
            .zip(&prev.cpu.per_core_usage)
            .map(|(&c, &p)| cpu_percent(c as f64 - p as f64, sys_delta, num_cores))
            .collect()
    });

    let mem_percent = if curr.memory.limit > 0 {
        clamp_percent(curr.memory.usage as f64 / curr.memory.limit as f64 * 100.0)
    } else {
        0.0
    };

    let (net_rx, net_tx) = curr.network_totals();
    let (disk_read, disk_write) = curr.block_io_totals();

    let elapsed_secs = match (prev.read_at, curr.read_at) {
        (Some(p), Some(c)) => Some((c - p).num_milliseconds() as f64 / 1000.0),
        _ => None,
    }
    .filter(|s| *s > 0.0);
    let (prev_rx, prev_tx) = prev.network_totals();
    let net_rx_per_sec = elapsed_secs.map(|s| net_rx.saturating_sub(prev_rx) as f64 / s);
    let net_tx_per_sec = elapsed_secs.map(|s| net_tx.saturating_sub(prev_tx) as f64 / s);

    DerivedMetrics {
        cpu_percent: cpu_percent(cpu_delta, sys_delta, num_cores),
        per_core_percent,
        mem_percent,
        mem_usage: curr.memory.usage,
        mem_limit: curr.memory.limit,
        net_rx,
        net_tx,
        net_rx_per_sec,
        net_tx_per_sec,
        disk_read,
        disk_write,
        pids: curr.pids,
    }
}

enum Exit {
    Cancelled,
    Detached,
    StartFailed(String),
    Ended(EndCause),
}

/// Owns one container's stats stream for the lifetime of one session.
pub(crate) struct TelemetrySession {
    ctx: SessionContext,
    stream: SnapshotStream,
}

impl TelemetrySession {
    /// Open the stats stream. The session stays Starting until its baseline snapshot arrives.
    pub(crate) fn open<R: ContainerRuntime>(runtime: &R, ctx: SessionContext) -> Self {
        let stream = runtime.stats_stream(&ctx.container_id);
        Self { ctx, stream }
    }

    pub(crate) async fn run(self) {
        let Self { ctx, mut stream } = self;
        let exit = pump(&ctx, &mut stream).await;
        // Release the runtime connection before reporting.
        drop(stream);

        let container_id = ctx.container_id.clone();
        match exit {
            Exit::Cancelled => {
                tracing::debug!(container_id = %container_id, "Telemetry session cancelled");
            }
            Exit::Detached => {
                tracing::debug!(container_id = %container_id, "Telemetry consumer went away");
            }
            Exit::StartFailed(reason) => {
                tracing::warn!(container_id = %container_id, reason = %reason, "Stats stream rejected");
                ctx.send(StreamMessage::StreamStartFailed {
                    container_id,
                    kind: ctx.kind,
                    reason,
                })
                .await;
            }
            Exit::Ended(cause) => {
                tracing::info!(container_id = %container_id, cause = %cause, "Stats stream ended");
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

async fn pump(ctx: &SessionContext, stream: &mut SnapshotStream) -> Exit {
    let mut prev: Option<RawSnapshot> = None;
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Exit::Cancelled,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(snapshot)) => {
                match prev.as_ref() {
                    Some(p) => {
                        let msg = StreamMessage::MetricsUpdated {
                            container_id: ctx.container_id.clone(),
                            metrics: derive_metrics(p, &snapshot),
                        };
                        match ctx.send(msg).await {
                            SendOutcome::Sent | SendOutcome::Dropped => {}
                            SendOutcome::Cancelled => return Exit::Cancelled,
                            SendOutcome::Closed => return Exit::Detached,
                        }
                    }
                    None => {
                        ctx.mark_active();
                        tracing::info!(container_id = %ctx.container_id, "Stats stream started");
                    }
                }
                prev = Some(snapshot);
            }
            Some(Err(StreamFault::Decode(e))) => {
                tracing::debug!(container_id = %ctx.container_id, error = %e, "Skipping malformed stats snapshot");
            }
            Some(Err(StreamFault::Transport(e))) => {
                return if prev.is_none() {
                    Exit::StartFailed(e)
                } else {
                    Exit::Ended(EndCause::Transport(e))
                };
            }
            None => {
                return if prev.is_none() {
                    Exit::StartFailed("stats stream closed before the first snapshot".into())
                } else {
                    Exit::Ended(EndCause::EndOfStream)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockIoEntry, BlockOp, CpuSample, InterfaceCounters, MemorySample};
    use chrono::{TimeZone, Utc};

    fn snapshot(total: u64, system: u64, cores: usize) -> RawSnapshot {
        RawSnapshot {
            cpu: CpuSample {
                total_usage: total,
                per_core_usage: vec![total / cores.max(1) as u64; cores],
                system_usage: system,
            },
            ..Default::default()
        }
    }

    #[test]
    fn cpu_percent_uses_system_delta() {
        let prev = snapshot(500_000_000, 10_000_000_000, 2);
        let curr = snapshot(1_000_000_000, 20_000_000_000, 2);
        let m = derive_metrics(&prev, &curr);
        assert!((m.cpu_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_system_delta_falls_back_and_clamps() {
        let prev = snapshot(500_000_000, 10_000_000_000, 2);
        let curr = snapshot(1_000_000_000, 10_000_000_000, 2);
        let m = derive_metrics(&prev, &curr);
        assert_eq!(m.cpu_percent, 100.0);
    }

    #[test]
    fn zero_deltas_give_zero_not_nan() {
        let s = snapshot(500, 1000, 4);
        let m = derive_metrics(&s, &s);
        assert_eq!(m.cpu_percent, 0.0);
        assert_eq!(m.per_core_percent, Some(vec![0.0; 4]));
    }

    #[test]
    fn cpu_percent_is_clamped_to_range() {
        assert_eq!(cpu_percent(5.0e9, 1.0e9, 8), 100.0);
        assert_eq!(cpu_percent(-5.0e9, 1.0e9, 8), 0.0);
        assert_eq!(cpu_percent(1.0, -1.0, 2), 0.0);
        assert_eq!(cpu_percent(f64::INFINITY, 1.0, 2), 0.0);
        assert_eq!(cpu_percent(f64::NAN, 1.0, 2), 0.0);
    }

    #[test]
    fn cores_default_to_one_without_per_core_counters() {
        let mut prev = snapshot(0, 0, 0);
        let mut curr = snapshot(0, 0, 0);
        prev.cpu.total_usage = 100;
        prev.cpu.system_usage = 1000;
        curr.cpu.total_usage = 200;
        curr.cpu.system_usage = 2000;
        let m = derive_metrics(&prev, &curr);
        assert!((m.cpu_percent - 10.0).abs() < 1e-9);
        assert!(m.per_core_percent.is_none());
    }

    #[test]
    fn per_core_computed_per_index() {
        let mut prev = snapshot(0, 1_000, 2);
        let mut curr = snapshot(0, 2_000, 2);
        prev.cpu.per_core_usage = vec![100, 100];
        curr.cpu.per_core_usage = vec![150, 300];
        let m = derive_metrics(&prev, &curr);
        let cores = m.per_core_percent.unwrap();
        assert_eq!(cores.len(), 2);
        assert!((cores[0] - 10.0).abs() < 1e-9);
        assert!((cores[1] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn per_core_omitted_when_core_count_changes() {
        let prev = snapshot(500_000_000, 10_000_000_000, 2);
        let curr = snapshot(1_000_000_000, 20_000_000_000, 4);
        let m = derive_metrics(&prev, &curr);
        assert!(m.per_core_percent.is_none());
        // cpu_percent still uses the current core count
        assert!((m.cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn mem_percent_zero_limit_is_zero() {
        let prev = snapshot(0, 0, 1);
        let mut curr = snapshot(0, 0, 1);
        curr.memory = MemorySample {
            usage: 1024,
            limit: 0,
        };
        assert_eq!(derive_metrics(&prev, &curr).mem_percent, 0.0);

        curr.memory = MemorySample {
            usage: 256,
            limit: 1024,
        };
        assert_eq!(derive_metrics(&prev, &curr).mem_percent, 25.0);

        curr.memory = MemorySample {
            usage: 4096,
            limit: 1024,
        };
        assert_eq!(derive_metrics(&prev, &curr).mem_percent, 100.0);
    }

    #[test]
    fn network_and_disk_are_cumulative_sums() {
        let prev = snapshot(0, 0, 1);
        let mut curr = snapshot(0, 0, 1);
        curr.networks.insert(
            "eth0".into(),
            InterfaceCounters {
                rx_bytes: 100,
                tx_bytes: 50,
            },
        );
        curr.networks.insert(
            "eth1".into(),
            InterfaceCounters {
                rx_bytes: 1,
                tx_bytes: 2,
            },
        );
        curr.block_io = vec![
            BlockIoEntry {
                op: BlockOp::Read,
                bytes: 10,
            },
            BlockIoEntry {
                op: BlockOp::Read,
                bytes: 5,
            },
            BlockIoEntry {
                op: BlockOp::Write,
                bytes: 7,
            },
            BlockIoEntry {
                op: BlockOp::Other,
                bytes: 1000,
            },
        ];
        let m = derive_metrics(&prev, &curr);
        assert_eq!((m.net_rx, m.net_tx), (101, 52));
        assert_eq!((m.disk_read, m.disk_write), (15, 7));
        assert!(m.net_rx_per_sec.is_none());
    }

    #[test]
    fn network_rates_use_read_timestamps() {
        let mut prev = snapshot(0, 0, 1);
        let mut curr = snapshot(0, 0, 1);
        prev.read_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        curr.read_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 2).unwrap());
        prev.networks.insert(
            "eth0".into(),
            InterfaceCounters {
                rx_bytes: 1000,
                tx_bytes: 5000,
            },
        );
        curr.networks.insert(
            "eth0".into(),
            InterfaceCounters {
                rx_bytes: 3000,
                tx_bytes: 4000,
            },
        );
        let m = derive_metrics(&prev, &curr);
        assert_eq!(m.net_rx_per_sec, Some(1000.0));
        // counter went backwards (interface recreated)
        assert_eq!(m.net_tx_per_sec, Some(0.0));

        curr.read_at = prev.read_at;
        assert!(derive_metrics(&prev, &curr).net_rx_per_sec.is_none());
    }
}
