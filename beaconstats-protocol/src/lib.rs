//! beaconstats Protocol Definitions
//!
//! Generated Rust code from Protocol Buffers.
//!
//! # Services
//! - `proto.Eth2Stats` - Session handshake, chain head feed and heartbeat
//! - `proto.Telemetry` - Scalar node metrics

/// Stats server messages and clients
pub mod stats {
    tonic::include_proto!("proto");
}

// Re-export commonly used types
pub use stats::eth2_stats_client::Eth2StatsClient;
pub use stats::telemetry_client::TelemetryClient;
pub use stats::{
    AttestationsRequest, ChainHeadRequest, ChainHeadResponse, ConnectRequest, ConnectResponse,
    HeartbeatRequest, HeartbeatResponse, MemoryUsageRequest, PeersRequest, SyncingRequest,
    TelemetryResponse,
};

/// Request metadata key carrying the session token
pub const TOKEN_METADATA_KEY: &str = "token";
