//! beaconstats Client Library
//!
//! Provides components for running the monitoring agent:
//! - Configuration management
//! - Session token persistence
//! - The gRPC stats server client
//! - Telemetry reporting and the session supervisor
//! - Prometheus metrics and health checking

pub mod config;
pub mod metrics;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod token;

pub use config::{
    BeaconSettings, ClientConfig, ConfigError, ConfigOverrides, DataSettings, MetricsSettings,
    ServerSettings,
};
pub use metrics::{init_metrics, ClientMetrics, HealthState, MetricsServer, SessionState};
pub use server::{ConnectInfo, GrpcStatsServer, StatsServer};
pub use session::{SessionManager, SessionSettings};
pub use telemetry::TelemetryReporter;
pub use token::{SessionToken, TokenStore};
