//! Telemetry reporter
//!
//! Samples the node's scalar metrics on a fixed interval and reports the
//! ones that changed since they were last reported.

use crate::metrics::ClientMetrics;
use crate::server::StatsServer;
use crate::token::SessionToken;
use beaconstats_core::{
    CapabilitySource, MemoryUsageSource, Metric, Result, SourceError, TelemetrySnapshot,
    TELEMETRY_INTERVAL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub struct TelemetryReporter {
    source: Arc<dyn CapabilitySource>,
    memory: Option<Arc<dyn MemoryUsageSource>>,
    server: Arc<dyn StatsServer>,
    token: Arc<SessionToken>,
    metrics: ClientMetrics,
    snapshot: TelemetrySnapshot,
    interval: Duration,
}

impl TelemetryReporter {
    pub fn new(
        source: Arc<dyn CapabilitySource>,
        memory: Option<Arc<dyn MemoryUsageSource>>,
        server: Arc<dyn StatsServer>,
        token: Arc<SessionToken>,
        metrics: ClientMetrics,
    ) -> Self {
        Self {
            source,
            memory,
            server,
            token,
            metrics,
            snapshot: TelemetrySnapshot::default(),
            interval: TELEMETRY_INTERVAL,
        }
    }

    /// Start from previously reported values instead of an empty snapshot
    pub fn with_snapshot(mut self, snapshot: TelemetrySnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Values as last reported upstream
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot
    }

    /// Report on every interval until cancelled. The first cycle runs at once.
    ///
    /// Returns the first upstream failure; node read failures only skip the
    /// affected metric for one cycle.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            self.report_cycle().await?;
        }
    }

    /// Sample every metric once and report the changed ones.
    /// Returns how many values were reported.
    pub async fn report_cycle(&mut self) -> Result<usize> {
        let mut reported = 0;

        for metric in self.sample().await {
            if !self.snapshot.should_report(&metric) {
                trace!(%metric, "Telemetry unchanged");
                continue;
            }

            let token = self.token.get().await;
            self.server.report_metric(metric, token.as_deref()).await?;

            metric.record(&mut self.snapshot);
            self.metrics.record_telemetry_report(metric.name());
            debug!(%metric, "Reported telemetry");
            reported += 1;
        }

        Ok(reported)
    }

    /// Current values of every metric the node can provide
    async fn sample(&self) -> Vec<Metric> {
        let mut sampled = Vec::with_capacity(4);

        if let Some(peers) = available("peers", self.source.peer_count().await) {
            sampled.push(Metric::Peers(peers));
        }
        if let Some(count) = available(
            "attestations_in_pool",
            self.source.attestations_in_pool_count().await,
        ) {
            sampled.push(Metric::AttestationsInPool(count));
        }
        if let Some(syncing) = available("syncing", self.source.sync_status().await) {
            sampled.push(Metric::Syncing(syncing));
        }
        if let Some(bytes) = self.memory.as_ref().and_then(|m| m.latest_memory_usage()) {
            sampled.push(Metric::MemoryUsage(bytes));
        }

        sampled
    }
}

/// Unsupported values are skipped silently, other failures with a warning
fn available<T>(name: &'static str, result: std::result::Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(SourceError::Unsupported) => None,
        Err(e) => {
            warn!(metric = name, error = %e, "Failed to read telemetry from node");
            None
        }
    }
}
