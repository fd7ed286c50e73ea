//! Adapter for Lighthouse's legacy REST API
//!
//! Only version, genesis time, peers and head are exposed. Attestation pool
//! size and sync status are unsupported.

use crate::http::{quantity, HttpApi};
use async_trait::async_trait;
use beaconstats_core::{CapabilitySource, ChainHead, SourceError};
use serde::Deserialize;

/// `beacon/head` body; slots arrive as strings on older releases
#[derive(Debug, Deserialize)]
struct Head {
    #[serde(deserialize_with = "quantity")]
    slot: u64,
    block_root: String,
    #[serde(deserialize_with = "quantity")]
    finalized_slot: u64,
    finalized_block_root: String,
    #[serde(deserialize_with = "quantity")]
    justified_slot: u64,
    justified_block_root: String,
}

impl From<Head> for ChainHead {
    fn from(head: Head) -> Self {
        ChainHead {
            head_slot: head.slot,
            head_block_root: head.block_root,
            finalized_slot: head.finalized_slot,
            finalized_block_root: head.finalized_block_root,
            justified_slot: head.justified_slot,
            justified_block_root: head.justified_block_root,
        }
    }
}

pub struct LighthouseClient {
    api: HttpApi,
}

impl LighthouseClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CapabilitySource for LighthouseClient {
    async fn version(&self) -> Result<String, SourceError> {
        self.api.get_json("node/version").await
    }

    async fn genesis_time(&self) -> Result<i64, SourceError> {
        self.api.get_json("beacon/genesis_time").await
    }

    async fn peer_count(&self) -> Result<i64, SourceError> {
        let peers: Vec<serde_json::Value> = self.api.get_json("network/peers").await?;
        Ok(peers.len() as i64)
    }

    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn sync_status(&self) -> Result<bool, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn chain_head(&self) -> Result<ChainHead, SourceError> {
        let head: Head = self.api.get_json("beacon/head").await?;
        Ok(head.into())
    }
}
