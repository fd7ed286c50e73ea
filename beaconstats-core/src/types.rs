//! Value types shared by adapters, the subscription layer and the client

use crate::MEMORY_USAGE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tip of the beacon chain plus the latest justified and finalized checkpoints.
///
/// Block roots are carried as opaque strings. Adapters disagree on whether
/// they are `0x`-prefixed and no normalisation is applied here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainHead {
    pub head_slot: u64,
    pub head_block_root: String,
    pub finalized_slot: u64,
    pub finalized_block_root: String,
    pub justified_slot: u64,
    pub justified_block_root: String,
}

impl fmt::Display for ChainHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "head={} finalized={} justified={}",
            self.head_slot, self.finalized_slot, self.justified_slot
        )
    }
}

/// Last reported telemetry values. `None` means never reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub peers: Option<i64>,
    pub attestations_in_pool: Option<i64>,
    pub syncing: Option<bool>,
    pub memory_usage_bytes: Option<i64>,
}

impl TelemetrySnapshot {
    /// Whether `metric` differs enough from the last reported value to be sent.
    ///
    /// Memory usage tolerates changes up to [`MEMORY_USAGE_THRESHOLD`] bytes;
    /// everything else is reported on any change.
    pub fn should_report(&self, metric: &Metric) -> bool {
        match *metric {
            Metric::Peers(v) => self.peers != Some(v),
            Metric::AttestationsInPool(v) => self.attestations_in_pool != Some(v),
            Metric::Syncing(v) => self.syncing != Some(v),
            Metric::MemoryUsage(v) => match self.memory_usage_bytes {
                Some(last) => v.abs_diff(last) > MEMORY_USAGE_THRESHOLD,
                None => true,
            },
        }
    }
}

/// A single telemetry value reported to the stats server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Peers(i64),
    AttestationsInPool(i64),
    Syncing(bool),
    MemoryUsage(i64),
}

impl Metric {
    /// Stable name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Peers(_) => "peers",
            Metric::AttestationsInPool(_) => "attestations_in_pool",
            Metric::Syncing(_) => "syncing",
            Metric::MemoryUsage(_) => "memory_usage",
        }
    }

    /// Store this value into the matching snapshot field
    pub fn record(&self, snapshot: &mut TelemetrySnapshot) {
        match *self {
            Metric::Peers(v) => snapshot.peers = Some(v),
            Metric::AttestationsInPool(v) => snapshot.attestations_in_pool = Some(v),
            Metric::Syncing(v) => snapshot.syncing = Some(v),
            Metric::MemoryUsage(v) => snapshot.memory_usage_bytes = Some(v),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Peers(v) | Metric::AttestationsInPool(v) | Metric::MemoryUsage(v) => {
                write!(f, "{}={}", self.name(), v)
            }
            Metric::Syncing(v) => write!(f, "{}={}", self.name(), v),
        }
    }
}
