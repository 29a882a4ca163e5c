// Convert raw Docker stats API responses into RawSnapshot.

use crate::models::{
    BlockIoEntry, BlockOp, CpuSample, InterfaceCounters, MemorySample, RawSnapshot,
};
use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};

/// Convert one stats payload. Returns `None` when the payload carries no CPU counters,
/// which the runtime emits for containers that are not (yet) running.
pub fn raw_snapshot(s: &ContainerStatsResponse) -> Option<RawSnapshot> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;

    let cpu = CpuSample {
        total_usage: cpu_usage.total_usage.unwrap_or(0),
        per_core_usage: cpu_usage.percpu_usage.clone().unwrap_or_default(),
        system_usage: cpu_stats.system_cpu_usage.unwrap_or(0),
    };

    let memory = MemorySample {
        usage: s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0),
        limit: s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0),
    };

    let networks = s
        .networks
        .as_ref()
        .map(|n| {
            n.iter()
                .map(|(name, v)| {
                    (
                        name.clone(),
                        InterfaceCounters {
                            rx_bytes: v.rx_bytes.unwrap_or(0),
                            tx_bytes: v.tx_bytes.unwrap_or(0),
                        },
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let block_io = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let op = BlockOp::from_docker(e.op.as_deref()?);
                    Some(BlockIoEntry {
                        op,
                        bytes: e.value.unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let pids = s.pids_stats.as_ref().and_then(|p| p.current).unwrap_or(0);

    let read_at = s
        .read
        .as_deref()
        .and_then(|r| DateTime::parse_from_rfc3339(r).ok())
        .map(|d| d.with_timezone(&Utc));

    Some(RawSnapshot {
        read_at,
        cpu,
        memory,
        networks,
        block_io,
        pids,
    })
}
