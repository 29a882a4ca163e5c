// Model serialization tests (JSON camelCase, tagged messages)

use dockwatch::models::*;

#[test]
fn test_derived_metrics_serialization_camel_case() {
    let m = DerivedMetrics {
        cpu_percent: 12.5,
        mem_percent: 50.0,
        mem_usage: 512,
        mem_limit: 1024,
        net_rx_per_sec: Some(10.0),
        ..Default::default()
    };
    let json = serde_json::to_string(&m).unwrap();
    assert!(json.contains("\"cpuPercent\":12.5"));
    assert!(json.contains("\"memLimit\":1024"));
    assert!(json.contains("\"netRxPerSec\""));
    assert!(!json.contains("netTxPerSec"));
    assert!(!json.contains("perCorePercent"));
    let back: DerivedMetrics = serde_json::from_str(&json).unwrap();
    assert_eq!(back, m);
}

#[test]
fn test_stream_message_is_tagged() {
    let msg = StreamMessage::StreamEnded {
        container_id: "abc".into(),
        kind: SessionKind::LogTail,
        cause: EndCause::Transport("reset".into()),
    };
    let v = serde_json::to_value(&msg).unwrap();
    assert_eq!(v["type"], "streamEnded");
    assert_eq!(v["containerId"], "abc");
    assert_eq!(v["kind"], "logTail");
    assert_eq!(v["cause"]["type"], "transport");
    assert_eq!(v["cause"]["detail"], "reset");
}

#[test]
fn test_container_state_lowercase_and_unknown_fallback() {
    assert_eq!(
        serde_json::to_string(&ContainerState::Running).unwrap(),
        "\"running\""
    );
    let s: ContainerState = serde_json::from_str("\"zombie\"").unwrap();
    assert_eq!(s, ContainerState::Unknown);
    assert_eq!(ContainerState::from_docker("Exited"), ContainerState::Exited);
    assert!(!ContainerState::Paused.is_running());
}

#[test]
fn test_block_op_parsing_is_case_insensitive() {
    assert_eq!(BlockOp::from_docker("Read"), BlockOp::Read);
    assert_eq!(BlockOp::from_docker("WRITE"), BlockOp::Write);
    assert_eq!(BlockOp::from_docker("sync"), BlockOp::Other);
}

#[test]
fn test_snapshot_totals_sum_interfaces_and_block_ops() {
    let mut s = RawSnapshot::default();
    s.networks.insert(
        "eth0".into(),
        InterfaceCounters {
            rx_bytes: 100,
            tx_bytes: 10,
        },
    );
    s.networks.insert(
        "eth1".into(),
        InterfaceCounters {
            rx_bytes: 50,
            tx_bytes: 5,
        },
    );
    s.block_io = vec![
        BlockIoEntry { op: BlockOp::Read, bytes: 7 },
        BlockIoEntry { op: BlockOp::Write, bytes: 3 },
        BlockIoEntry { op: BlockOp::Read, bytes: 1 },
        BlockIoEntry { op: BlockOp::Other, bytes: 99 },
    ];
    assert_eq!(s.network_totals(), (150, 15));
    assert_eq!(s.block_io_totals(), (8, 3));
}

#[test]
fn test_message_helpers() {
    let line = StreamMessage::LogLineReceived {
        container_id: "c9".into(),
        text: "x".into(),
    };
    assert_eq!(line.container_id(), "c9");
    assert!(!line.is_terminal());
    let failed = StreamMessage::StreamStartFailed {
        container_id: "c9".into(),
        kind: SessionKind::Telemetry,
        reason: "gone".into(),
    };
    assert!(failed.is_terminal());
}
