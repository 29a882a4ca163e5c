// Domain models for the telemetry and log-streaming engine

mod container;
mod message;
mod metrics;

pub use container::ContainerState;
pub use message::{EndCause, SessionKind, StreamMessage};
pub use metrics::{
    BlockIoEntry, BlockOp, CpuSample, DerivedMetrics, InterfaceCounters, MemorySample,
    RawSnapshot,
};
