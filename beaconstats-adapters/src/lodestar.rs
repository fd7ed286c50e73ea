//! Adapter for Lodestar's pre-standard REST API
//!
//! Every numeric field arrives as a string. Before genesis the node reports
//! an empty head, which is read as slot 0 with placeholder roots.

use crate::http::{parse_quantity, HttpApi, Quantity};
use async_trait::async_trait;
use beaconstats_core::{CapabilitySource, ChainHead, SourceError};
use serde::Deserialize;

/// Root reported for every checkpoint before genesis
const PRE_GENESIS_ROOT: &str = "0x0";

/// `node/syncing` body
#[derive(Debug, Deserialize)]
struct Syncing {
    current_block: String,
    highest_block: String,
}

impl Syncing {
    fn is_syncing(&self) -> Result<bool, SourceError> {
        Ok(parse_quantity(&self.current_block)? < parse_quantity(&self.highest_block)?)
    }
}

/// `node/head` body
#[derive(Debug, Deserialize)]
struct Head {
    head_slot: String,
    head_block_root: String,
    finalized_slot: String,
    finalized_block_root: String,
    justified_slot: String,
    justified_block_root: String,
}

impl TryFrom<Head> for ChainHead {
    type Error = SourceError;

    fn try_from(head: Head) -> Result<Self, Self::Error> {
        if head.head_slot.trim().is_empty() {
            return Ok(ChainHead {
                head_slot: 0,
                head_block_root: PRE_GENESIS_ROOT.to_string(),
                finalized_slot: 0,
                finalized_block_root: PRE_GENESIS_ROOT.to_string(),
                justified_slot: 0,
                justified_block_root: PRE_GENESIS_ROOT.to_string(),
            });
        }

        Ok(ChainHead {
            head_slot: parse_quantity(&head.head_slot)?,
            head_block_root: head.head_block_root,
            finalized_slot: parse_quantity(&head.finalized_slot)?,
            finalized_block_root: head.finalized_block_root,
            justified_slot: parse_quantity(&head.justified_slot)?,
            justified_block_root: head.justified_block_root,
        })
    }
}

pub struct LodestarClient {
    api: HttpApi,
}

impl LodestarClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CapabilitySource for LodestarClient {
    async fn version(&self) -> Result<String, SourceError> {
        self.api.get_json("node/version").await
    }

    async fn genesis_time(&self) -> Result<i64, SourceError> {
        let Quantity(genesis_time) = self.api.get_json("node/genesis_time").await?;
        i64::try_from(genesis_time)
            .map_err(|_| SourceError::Parse(format!("genesis time {} out of range", genesis_time)))
    }

    async fn peer_count(&self) -> Result<i64, SourceError> {
        let peers: Vec<String> = self.api.get_json("node/peers").await?;
        Ok(peers.len() as i64)
    }

    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn sync_status(&self) -> Result<bool, SourceError> {
        let status: Syncing = self.api.get_json("node/syncing").await?;
        status.is_syncing()
    }

    async fn chain_head(&self) -> Result<ChainHead, SourceError> {
        let head: Head = self.api.get_json("node/head").await?;
        head.try_into()
    }
}
