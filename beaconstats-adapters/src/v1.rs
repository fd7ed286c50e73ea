//! Adapter for the standard beacon node REST API (`/eth/v1/...`)
//!
//! The attestation pool endpoint lists every pooled attestation, which is far
//! too heavy to poll, so that metric is reported as unsupported. Head updates
//! are polled.

use crate::http::{quantity, HttpApi};
use async_trait::async_trait;
use beaconstats_core::{CapabilitySource, ChainHead, SourceError};
use serde::Deserialize;
use tracing::debug;

/// Slots per epoch on every public network
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Standard API responses wrap their payload in `data`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Version {
    version: String,
}

#[derive(Debug, Deserialize)]
struct Genesis {
    #[serde(deserialize_with = "quantity")]
    genesis_time: u64,
}

#[derive(Debug, Deserialize)]
struct Syncing {
    #[serde(deserialize_with = "quantity")]
    sync_distance: u64,
}

#[derive(Debug, Deserialize)]
struct BlockRoot {
    root: String,
}

#[derive(Debug, Deserialize)]
struct HeaderData {
    header: SignedHeader,
}

#[derive(Debug, Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[derive(Debug, Deserialize)]
struct HeaderMessage {
    #[serde(deserialize_with = "quantity")]
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct FinalityCheckpoints {
    current_justified: Checkpoint,
    finalized: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    #[serde(deserialize_with = "quantity")]
    epoch: u64,
    root: String,
}

/// Client for nodes implementing the standard beacon API
pub struct StandardApiClient {
    api: HttpApi,
}

impl StandardApiClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let envelope: Envelope<T> = self.api.get_json(path).await?;
        Ok(envelope.data)
    }

    async fn block_slot(&self, block_id: &str) -> Result<u64, SourceError> {
        let header: HeaderData = self
            .get(&format!("eth/v1/beacon/headers/{}", block_id))
            .await?;
        Ok(header.header.message.slot)
    }
}

/// First slot of `epoch`
pub fn start_slot_of_epoch(epoch: u64) -> u64 {
    epoch.saturating_mul(SLOTS_PER_EPOCH)
}

#[async_trait]
impl CapabilitySource for StandardApiClient {
    async fn version(&self) -> Result<String, SourceError> {
        let version: Version = self.get("eth/v1/node/version").await?;
        Ok(version.version)
    }

    async fn genesis_time(&self) -> Result<i64, SourceError> {
        let genesis: Genesis = self.get("eth/v1/beacon/genesis").await?;
        i64::try_from(genesis.genesis_time).map_err(|_| {
            SourceError::Parse(format!("genesis time {} out of range", genesis.genesis_time))
        })
    }

    async fn peer_count(&self) -> Result<i64, SourceError> {
        let peers: Vec<serde_json::Value> = self.get("eth/v1/node/peers").await?;
        Ok(peers.len() as i64)
    }

    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn sync_status(&self) -> Result<bool, SourceError> {
        let syncing: Syncing = self.get("eth/v1/node/syncing").await?;
        Ok(syncing.sync_distance != 0)
    }

    async fn chain_head(&self) -> Result<ChainHead, SourceError> {
        let head: BlockRoot = self.get("eth/v1/beacon/blocks/head/root").await?;
        let head_slot = self.block_slot(&head.root).await?;

        let checkpoints: FinalityCheckpoints = self
            .get("eth/v1/beacon/states/head/finality_checkpoints")
            .await?;

        debug!(head_slot, head_root = %head.root, "Fetched chain head");

        Ok(ChainHead {
            head_slot,
            head_block_root: head.root,
            finalized_slot: start_slot_of_epoch(checkpoints.finalized.epoch),
            finalized_block_root: checkpoints.finalized.root,
            justified_slot: start_slot_of_epoch(checkpoints.current_justified.epoch),
            justified_block_root: checkpoints.current_justified.root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_slot_of_epoch() {
        assert_eq!(start_slot_of_epoch(0), 0);
        assert_eq!(start_slot_of_epoch(3), 96);
        assert_eq!(start_slot_of_epoch(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_decode_finality_checkpoints() {
        let body = r#"{
            "execution_optimistic": false,
            "data": {
                "previous_justified": {"epoch": "9", "root": "0x09"},
                "current_justified": {"epoch": "10", "root": "0x0a"},
                "finalized": {"epoch": 9, "root": "0x09"}
            }
        }"#;

        let decoded: Envelope<FinalityCheckpoints> = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.data.current_justified.epoch, 10);
        assert_eq!(decoded.data.current_justified.root, "0x0a");
        assert_eq!(decoded.data.finalized.epoch, 9);
    }

    #[test]
    fn test_decode_header_slot() {
        let body = r#"{"data":{"root":"0xab","canonical":true,"header":{"message":{"slot":"4242","proposer_index":"1"},"signature":"0x00"}}}"#;
        let decoded: Envelope<HeaderData> = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.data.header.message.slot, 4242);
    }

    #[test]
    fn test_decode_syncing() {
        let body = r#"{"data":{"head_slot":"100","sync_distance":"0","is_syncing":false}}"#;
        let decoded: Envelope<Syncing> = serde_json::from_str(body).unwrap();
        assert_eq!(decoded.data.sync_distance, 0);
    }
}
