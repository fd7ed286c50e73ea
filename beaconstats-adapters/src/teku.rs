//! Adapter for Teku's pre-standard REST API
//!
//! Teku serves a combined `beacon/chainhead` view and a cheap peer counter.
//! The attestation pool size is unsupported.

use crate::http::{quantity, HttpApi, Quantity};
use async_trait::async_trait;
use beaconstats_core::{CapabilitySource, ChainHead, SourceError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Syncing {
    syncing: bool,
}

/// `beacon/chainhead` body; epoch fields are ignored
#[derive(Debug, Deserialize)]
struct Head {
    #[serde(deserialize_with = "quantity")]
    head_slot: u64,
    head_block_root: String,
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
            head_slot: head.head_slot,
            head_block_root: head.head_block_root,
            finalized_slot: head.finalized_slot,
            finalized_block_root: head.finalized_block_root,
            justified_slot: head.justified_slot,
            justified_block_root: head.justified_block_root,
        }
    }
}

pub struct TekuClient {
    api: HttpApi,
}

impl TekuClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CapabilitySource for TekuClient {
    async fn version(&self) -> Result<String, SourceError> {
        self.api.get_json("node/version").await
    }

    async fn genesis_time(&self) -> Result<i64, SourceError> {
        let Quantity(genesis_time) = self.api.get_json("node/genesis_time").await?;
        i64::try_from(genesis_time)
            .map_err(|_| SourceError::Parse(format!("genesis time {} out of range", genesis_time)))
    }

    async fn peer_count(&self) -> Result<i64, SourceError> {
        self.api.get_json("network/peer_count").await
    }

    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn sync_status(&self) -> Result<bool, SourceError> {
        let status: Syncing = self.api.get_json("node/syncing").await?;
        Ok(status.syncing)
    }

    async fn chain_head(&self) -> Result<ChainHead, SourceError> {
        let head: Head = self.api.get_json("beacon/chainhead").await?;
        Ok(head.into())
    }
}
