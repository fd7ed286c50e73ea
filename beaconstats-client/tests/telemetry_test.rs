//! Telemetry Reporter Tests
//!
//! Drives report cycles against mock node and server doubles.
//!
//! Run with: cargo test --test telemetry_test

mod common;

use beaconstats_client::{ClientMetrics, TelemetryReporter};
use beaconstats_core::{Metric, SourceError, TelemetrySnapshot};
use common::{temp_token, MockMemory, MockServer, MockSource, Script, MIB};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn reporter(
    source: MockSource,
    memory: Option<Arc<MockMemory>>,
    server: Arc<MockServer>,
    dir: &TempDir,
) -> TelemetryReporter {
    TelemetryReporter::new(
        Arc::new(source),
        memory.map(|m| m as Arc<dyn beaconstats_core::MemoryUsageSource>),
        server,
        temp_token(dir),
        ClientMetrics::new("test-node"),
    )
}

/// A source answering only the given peer counts
fn peers_only(peers: Script<i64>) -> MockSource {
    MockSource {
        peers,
        attestations: Script::unsupported(),
        syncing: Script::unsupported(),
        ..MockSource::default()
    }
}

#[tokio::test]
async fn test_only_changed_values_are_reported() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let source = peers_only(Script::values([4, 4, 7, 7, 7, 9]));

    let mut reporter = reporter(source, None, server.clone(), &dir).with_snapshot(
        TelemetrySnapshot {
            peers: Some(4),
            ..TelemetrySnapshot::default()
        },
    );

    for _ in 0..6 {
        reporter.report_cycle().await.unwrap();
    }

    assert_eq!(server.metrics(), vec![Metric::Peers(7), Metric::Peers(9)]);
    assert_eq!(reporter.snapshot().peers, Some(9));
}

#[tokio::test]
async fn test_memory_usage_threshold() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let memory = Arc::new(MockMemory::default());
    let source = peers_only(Script::unsupported());

    let mut reporter = reporter(source, Some(memory.clone()), server.clone(), &dir).with_snapshot(
        TelemetrySnapshot {
            memory_usage_bytes: Some(100 * MIB),
            ..TelemetrySnapshot::default()
        },
    );

    for bytes in [100 * MIB, 100 * MIB + MIB / 2, 112 * MIB] {
        memory.set(bytes);
        reporter.report_cycle().await.unwrap();
    }

    assert_eq!(server.metrics(), vec![Metric::MemoryUsage(112 * MIB)]);
}

#[tokio::test]
async fn test_memory_usage_exactly_at_threshold_is_not_reported() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let memory = Arc::new(MockMemory::default());

    let mut reporter = reporter(
        peers_only(Script::unsupported()),
        Some(memory.clone()),
        server.clone(),
        &dir,
    );

    // Nothing sampled yet
    assert_eq!(reporter.report_cycle().await.unwrap(), 0);

    memory.set(50 * MIB);
    assert_eq!(reporter.report_cycle().await.unwrap(), 1);

    memory.set(60 * MIB);
    assert_eq!(reporter.report_cycle().await.unwrap(), 0);

    memory.set(60 * MIB + 1);
    assert_eq!(reporter.report_cycle().await.unwrap(), 1);

    assert_eq!(
        server.metrics(),
        vec![Metric::MemoryUsage(50 * MIB), Metric::MemoryUsage(60 * MIB + 1)]
    );
}

#[tokio::test]
async fn test_unsupported_values_are_never_reported() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let source = MockSource {
        peers: Script::values([3]),
        attestations: Script::unsupported(),
        syncing: Script::values([true, false]),
        ..MockSource::default()
    };

    let mut reporter = reporter(source, None, server.clone(), &dir);
    for _ in 0..3 {
        reporter.report_cycle().await.unwrap();
    }

    let reported = server.metrics();
    assert_eq!(
        reported,
        vec![Metric::Peers(3), Metric::Syncing(true), Metric::Syncing(false)]
    );
    assert!(!reported
        .iter()
        .any(|m| matches!(m, Metric::AttestationsInPool(_))));
    assert_eq!(reporter.snapshot().attestations_in_pool, None);
}

#[tokio::test]
async fn test_source_failure_skips_one_cycle() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let source = peers_only(Script::answers([
        Err(SourceError::Request("connection reset".to_string())),
        Ok(8),
    ]));

    let mut reporter = reporter(source, None, server.clone(), &dir);
    assert_eq!(reporter.report_cycle().await.unwrap(), 0);
    assert_eq!(reporter.report_cycle().await.unwrap(), 1);
    assert_eq!(server.metrics(), vec![Metric::Peers(8)]);
}

#[tokio::test]
async fn test_upstream_failure_leaves_snapshot_unchanged() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let seeded = TelemetrySnapshot {
        peers: Some(4),
        ..TelemetrySnapshot::default()
    };

    let mut reporter =
        reporter(peers_only(Script::values([5])), None, server.clone(), &dir).with_snapshot(seeded);

    server.fail_metrics(true);
    assert!(reporter.report_cycle().await.is_err());
    assert_eq!(reporter.snapshot(), seeded);

    // The value is still pending and goes out once the server recovers
    server.fail_metrics(false);
    assert_eq!(reporter.report_cycle().await.unwrap(), 1);
    assert_eq!(reporter.snapshot().peers, Some(5));
}

#[tokio::test]
async fn test_reports_carry_session_token() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let token = temp_token(&dir);
    token.update("abc123".to_string()).await.unwrap();

    let mut reporter = TelemetryReporter::new(
        Arc::new(peers_only(Script::values([1]))),
        None,
        server.clone(),
        token,
        ClientMetrics::new("test-node"),
    );
    reporter.report_cycle().await.unwrap();

    let calls = server.metrics.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].token.as_deref(), Some("abc123"));
}

#[tokio::test(start_paused = true)]
async fn test_run_reports_immediately_then_every_interval() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    let source = peers_only(Script::values([1, 2, 3, 4]));

    let mut reporter = reporter(source, None, server.clone(), &dir)
        .with_interval(Duration::from_secs(12));

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        stopper.cancel();
    });

    reporter.run(&cancel).await.unwrap();

    // Cycles at 0s, 12s and 24s
    assert_eq!(
        server.metrics(),
        vec![Metric::Peers(1), Metric::Peers(2), Metric::Peers(3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_upstream_failure() {
    let dir = TempDir::new().unwrap();
    let server = Arc::new(MockServer::default());
    server.fail_metrics(true);

    let mut reporter = reporter(peers_only(Script::values([1])), None, server.clone(), &dir);
    let cancel = CancellationToken::new();

    let result = tokio::time::timeout(Duration::from_secs(1), reporter.run(&cancel)).await;
    assert!(matches!(result, Ok(Err(_))));
    assert_eq!(reporter.snapshot(), TelemetrySnapshot::default());
}
