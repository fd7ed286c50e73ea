//! beaconstats Node Adapters
//!
//! Implementations of [`CapabilitySource`] for the supported beacon node
//! APIs, plus the Prometheus scraper feeding memory usage.
//!
//! # Backends
//! - `v1` - Standard beacon node REST API (`/eth/v1/...`)
//! - `lighthouse` - Lighthouse's legacy REST API
//! - `teku` - Teku's pre-standard REST API
//! - `lodestar` - Lodestar's pre-standard REST API
//! - `nimbus` - Nimbus's JSON-RPC API

pub mod http;
pub mod lighthouse;
pub mod lodestar;
pub mod memory;
pub mod nimbus;
pub mod prometheus;
pub mod teku;
pub mod v1;

pub use http::HttpApi;
pub use lighthouse::LighthouseClient;
pub use lodestar::LodestarClient;
pub use memory::MemoryWatcher;
pub use nimbus::NimbusClient;
pub use teku::TekuClient;
pub use v1::StandardApiClient;

use beaconstats_core::{BeaconStatsError, CapabilitySource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Supported node API flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    V1,
    Lighthouse,
    Teku,
    Lodestar,
    Nimbus,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::V1 => "v1",
            BackendKind::Lighthouse => "lighthouse",
            BackendKind::Teku => "teku",
            BackendKind::Lodestar => "lodestar",
            BackendKind::Nimbus => "nimbus",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BeaconStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "standard" => Ok(BackendKind::V1),
            "lighthouse" => Ok(BackendKind::Lighthouse),
            "teku" => Ok(BackendKind::Teku),
            "lodestar" => Ok(BackendKind::Lodestar),
            "nimbus" => Ok(BackendKind::Nimbus),
            other => Err(BeaconStatsError::UnknownBackend(other.to_string())),
        }
    }
}

/// Build the adapter for `kind` talking to `address`
pub fn build_source(
    kind: BackendKind,
    address: &str,
    request_timeout: Duration,
) -> Result<Arc<dyn CapabilitySource>, BeaconStatsError> {
    let api = HttpApi::new(address, request_timeout)?;
    info!(kind = %kind, address = %api.base_url(), "Configured beacon node adapter");

    let source: Arc<dyn CapabilitySource> = match kind {
        BackendKind::V1 => Arc::new(StandardApiClient::new(api)),
        BackendKind::Lighthouse => Arc::new(LighthouseClient::new(api)),
        BackendKind::Teku => Arc::new(TekuClient::new(api)),
        BackendKind::Lodestar => Arc::new(LodestarClient::new(api)),
        BackendKind::Nimbus => Arc::new(NimbusClient::new(api)),
    };
    Ok(source)
}
