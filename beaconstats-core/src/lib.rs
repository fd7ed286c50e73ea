//! beaconstats Core Library
//!
//! Core abstractions for the beaconstats monitoring agent.
//! This crate provides:
//! - Chain head and telemetry value types
//! - The capability interface every beacon node adapter implements
//! - Change-detecting chain head subscriptions (push and pull)
//! - The token bucket used to rate limit head reports
//! - Common error types

pub mod capability;
pub mod error;
pub mod rate_limit;
pub mod subscription;
pub mod types;

pub use capability::{CapabilitySource, HeadStream, MemoryUsageSource};
pub use error::{BeaconStatsError, Result, Severity, SourceError};
pub use rate_limit::UpdateRateLimiter;
pub use subscription::{
    subscribe_chain_heads, ChainHeadSubscription, HeadChangeDetector, SubscriptionMode,
};
pub use types::{ChainHead, Metric, TelemetrySnapshot};

use std::time::Duration;

/// Interval between liveness pings to the stats server
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between telemetry sampling cycles
pub const TELEMETRY_INTERVAL: Duration = Duration::from_secs(12);

/// Interval between chain head polls for sources without a native stream
pub const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before a failed session is re-established
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(12);

/// Delay between connect attempts while the stats server is unreachable
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Memory usage changes at or below this many bytes are not reported
pub const MEMORY_USAGE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10 MiB

/// Capacity of the channel between a subscription producer and its consumer
pub const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 1;
