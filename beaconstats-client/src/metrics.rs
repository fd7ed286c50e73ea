//! Prometheus metrics for the beaconstats client
//!
//! Exposes session health and reporting activity.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

/// Metric names as constants
pub mod names {
    // Session metrics
    pub const SESSION_STATE: &str = "beaconstats_session_state";
    pub const SESSION_RESTARTS: &str = "beaconstats_session_restarts_total";
    pub const HEARTBEAT_SUCCESS: &str = "beaconstats_heartbeat_success_total";
    pub const HEARTBEAT_FAILURE: &str = "beaconstats_heartbeat_failure_total";

    // Head metrics
    pub const HEAD_REPORTS: &str = "beaconstats_head_reports_total";
    pub const HEAD_REPORTS_SKIPPED: &str = "beaconstats_head_reports_skipped_total";
    pub const HEAD_SLOT: &str = "beaconstats_head_slot";

    // Telemetry metrics
    pub const TELEMETRY_REPORTS: &str = "beaconstats_telemetry_reports_total";
}

/// Initialize metric descriptions
pub fn init_metrics() {
    describe_gauge!(
        names::SESSION_STATE,
        "Session state (0 disconnected, 1 handshaking, 2 active, 3 shutting down)"
    );
    describe_counter!(
        names::SESSION_RESTARTS,
        "Number of sessions torn down by a fatal error"
    );
    describe_counter!(
        names::HEARTBEAT_SUCCESS,
        "Number of successful heartbeats"
    );
    describe_counter!(names::HEARTBEAT_FAILURE, "Number of failed heartbeats");

    describe_counter!(
        names::HEAD_REPORTS,
        "Chain head changes forwarded to the stats server"
    );
    describe_counter!(
        names::HEAD_REPORTS_SKIPPED,
        "Chain head changes dropped by the rate limiter"
    );
    describe_gauge!(names::HEAD_SLOT, "Last head slot forwarded");

    describe_counter!(
        names::TELEMETRY_REPORTS,
        "Telemetry values reported, by metric"
    );
}

/// Lifecycle of the stats server session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Handshaking,
    Active,
    ShuttingDown,
}

impl SessionState {
    fn gauge_value(self) -> f64 {
        match self {
            SessionState::Disconnected => 0.0,
            SessionState::Handshaking => 1.0,
            SessionState::Active => 2.0,
            SessionState::ShuttingDown => 3.0,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Handshaking => "handshaking",
            SessionState::Active => "active",
            SessionState::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Metrics recorder for the session and its loops
#[derive(Clone)]
pub struct ClientMetrics {
    node_name: String,
}

impl ClientMetrics {
    pub fn new(node_name: impl Into<String>) -> Self {
        let metrics = Self {
            node_name: node_name.into(),
        };
        metrics.set_session_state(SessionState::Disconnected);
        metrics
    }

    pub fn set_session_state(&self, state: SessionState) {
        gauge!(names::SESSION_STATE, "node" => self.node_name.clone()).set(state.gauge_value());
    }

    pub fn record_session_restart(&self) {
        counter!(names::SESSION_RESTARTS, "node" => self.node_name.clone()).increment(1);
    }

    /// Record heartbeat result
    pub fn record_heartbeat(&self, success: bool) {
        if success {
            counter!(names::HEARTBEAT_SUCCESS, "node" => self.node_name.clone()).increment(1);
        } else {
            counter!(names::HEARTBEAT_FAILURE, "node" => self.node_name.clone()).increment(1);
        }
    }

    pub fn record_head_report(&self, slot: u64) {
        counter!(names::HEAD_REPORTS, "node" => self.node_name.clone()).increment(1);
        gauge!(names::HEAD_SLOT, "node" => self.node_name.clone()).set(slot as f64);
    }

    pub fn record_head_skipped(&self) {
        counter!(names::HEAD_REPORTS_SKIPPED, "node" => self.node_name.clone()).increment(1);
    }

    pub fn record_telemetry_report(&self, metric: &'static str) {
        let labels = [
            ("node", self.node_name.clone()),
            ("metric", metric.to_string()),
        ];
        counter!(names::TELEMETRY_REPORTS, &labels).increment(1);
    }
}

/// HTTP server for metrics endpoint
pub struct MetricsServer {
    handle: PrometheusHandle,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server, install the global recorder and
    /// register the metric descriptions with it
    pub fn new(port: u16) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

        let builder = PrometheusBuilder::new();
        let handle = builder.install_recorder()?;
        // Descriptions sent before the recorder exists are dropped
        init_metrics();

        Ok(Self { handle, addr })
    }

    /// Start the metrics HTTP server
    pub async fn start(
        self,
        health_path: String,
        metrics_path: String,
        health_state: Arc<RwLock<HealthState>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = router(self.handle, &health_path, &metrics_path, health_state);

        info!(addr = %self.addr, "Starting metrics server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

fn router(
    handle: PrometheusHandle,
    health_path: &str,
    metrics_path: &str,
    health_state: Arc<RwLock<HealthState>>,
) -> axum::Router {
    use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

    // Health check handler
    let health_handler = move || {
        let state = health_state.clone();
        async move {
            let health = state.read().await;
            let status = if health.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, health.describe()).into_response()
        }
    };

    // Metrics handler
    let metrics_handler = move || {
        let handle = handle.clone();
        async move { handle.render() }
    };

    Router::new()
        .route(health_path, get(health_handler))
        .route(metrics_path, get(metrics_handler))
}

/// Health state published by the session manager
#[derive(Debug, Clone)]
pub struct HealthState {
    pub state: SessionState,
    pub last_change: Instant,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            last_change: Instant::now(),
        }
    }
}

impl HealthState {
    /// Healthy only while a session is active
    pub fn is_healthy(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Update health state
    pub fn update(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.last_change = Instant::now();
        }
    }

    /// How long the current state has held
    pub fn state_age(&self) -> Duration {
        self.last_change.elapsed()
    }

    /// Health endpoint body, e.g. `active for 42s`
    pub fn describe(&self) -> String {
        format!("{} for {}s", self.state, self.state_age().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_reach_the_installed_recorder() {
        // The only test in this binary that installs the global recorder
        let server = MetricsServer::new(0).unwrap();

        let metrics = ClientMetrics::new("test-node");
        metrics.record_heartbeat(true);
        metrics.record_telemetry_report("peers");

        let rendered = server.handle.render();
        assert!(rendered.contains("# HELP beaconstats_session_state Session state"));
        assert!(rendered.contains("# HELP beaconstats_heartbeat_success_total"));
        assert!(rendered.contains("beaconstats_telemetry_reports_total{"));
    }

    #[test]
    fn test_health_body_reports_state_age() {
        let mut state = HealthState::default();
        state.update(SessionState::Active);
        assert_eq!(state.describe(), "active for 0s");

        if let Some(earlier) = Instant::now().checked_sub(Duration::from_secs(90)) {
            state.last_change = earlier;
            assert!(state.state_age() >= Duration::from_secs(90));
            assert!(state.describe().starts_with("active for 9"));
        }
    }

    #[test]
    fn test_health_state() {
        let mut state = HealthState::default();
        assert!(!state.is_healthy());

        state.update(SessionState::Handshaking);
        assert!(!state.is_healthy());

        state.update(SessionState::Active);
        assert!(state.is_healthy());

        state.update(SessionState::Disconnected);
        assert!(!state.is_healthy());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }
}
