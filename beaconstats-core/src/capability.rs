//! Capability interface implemented by every beacon node adapter
//!
//! The rest of the agent only talks to a node through [`CapabilitySource`].
//! Backends that cannot provide a value return [`SourceError::Unsupported`].

use crate::error::SourceError;
use crate::types::ChainHead;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Native stream of head transitions pushed by the node
pub type HeadStream = BoxStream<'static, Result<ChainHead, SourceError>>;

/// Read access to one monitored beacon node
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Node software version string
    async fn version(&self) -> Result<String, SourceError>;

    /// Chain genesis time in unix seconds
    async fn genesis_time(&self) -> Result<i64, SourceError>;

    /// Number of connected peers
    async fn peer_count(&self) -> Result<i64, SourceError>;

    /// Number of attestations waiting in the node's pool
    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError>;

    /// Whether the node is still syncing
    async fn sync_status(&self) -> Result<bool, SourceError>;

    /// Current chain head. Adapters are authoritative for the returned value.
    async fn chain_head(&self) -> Result<ChainHead, SourceError>;

    /// Open the node's native head stream.
    ///
    /// Sources without one keep the default, which makes subscriptions fall
    /// back to polling [`CapabilitySource::chain_head`].
    async fn open_head_stream(&self) -> Result<HeadStream, SourceError> {
        Err(SourceError::Unsupported)
    }
}

/// Latest resident memory usage of the node process, if sampled yet
pub trait MemoryUsageSource: Send + Sync {
    fn latest_memory_usage(&self) -> Option<i64>;
}
