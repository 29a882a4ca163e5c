// Raw stats snapshots and the metrics derived from consecutive pairs of them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CPU counters from one stats payload (nanoseconds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSample {
    pub total_usage: u64,
    pub per_core_usage: Vec<u64>,
    pub system_usage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOp {
    Read,
    Write,
    /// Sync, Async, Discard, Total and anything else the runtime reports.
    Other,
}

impl BlockOp {
    /// Parse a blkio op name; the runtime reports both "Read" and "read".
    pub fn from_docker(op: &str) -> Self {
        if op.eq_ignore_ascii_case("read") {
            BlockOp::Read
        } else if op.eq_ignore_ascii_case("write") {
            BlockOp::Write
        } else {
            BlockOp::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIoEntry {
    pub op: BlockOp,
    pub bytes: u64,
}

/// One stats payload as emitted by the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    /// Runtime-side sample time, when the payload carries one.
    pub read_at: Option<DateTime<Utc>>,
    pub cpu: CpuSample,
    pub memory: MemorySample,
    pub networks: HashMap<String, InterfaceCounters>,
    pub block_io: Vec<BlockIoEntry>,
    pub pids: u64,
}

impl RawSnapshot {
    /// (rx, tx) summed across all interfaces.
    pub fn network_totals(&self) -> (u64, u64) {
        self.networks.values().fold((0u64, 0u64), |(rx, tx), n| {
            (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes))
        })
    }

    /// (read, write) summed across matching blkio entries.
    pub fn block_io_totals(&self) -> (u64, u64) {
        self.block_io
            .iter()
            .fold((0u64, 0u64), |(read, write), e| match e.op {
                BlockOp::Read => (read.saturating_add(e.bytes), write),
                BlockOp::Write => (read, write.saturating_add(e.bytes)),
                BlockOp::Other => (read, write),
            })
    }
}

/// Metrics computed from two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Always within [0, 100].
    pub cpu_percent: f64,
    /// Omitted when the core count changed between the two snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_core_percent: Option<Vec<f64>>,
    /// Always within [0, 100]; 0 when the limit is 0.
    pub mem_percent: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    /// Cumulative bytes received, summed across interfaces.
    pub net_rx: u64,
    /// Cumulative bytes transmitted, summed across interfaces.
    pub net_tx: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_rx_per_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_tx_per_sec: Option<f64>,
    pub disk_read: u64,
    pub disk_write: u64,
    pub pids: u64,
}
