//! Adapter for Nimbus's JSON-RPC API
//!
//! Every call is a JSON-RPC request posted to the node's base URL. Nimbus
//! has no genesis time call, so the Medalla genesis time is announced.

use crate::http::{quantity, HttpApi};
use async_trait::async_trait;
use beaconstats_core::{CapabilitySource, ChainHead, SourceError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Genesis time announced for Nimbus nodes
pub const NIMBUS_GENESIS_TIME: i64 = 1_587_981_600;

const REQUEST_ID: u64 = 123;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    id: u64,
    params: [(); 0],
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &str) -> Result<T, SourceError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(SourceError::Request(format!("{}: {}", method, error))),
            (Some(result), _) => Ok(result),
            (None, _) => Err(SourceError::Parse(format!("{}: missing result", method))),
        }
    }
}

/// `getChainHead` result; roots come without a `0x` prefix
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

pub struct NimbusClient {
    api: HttpApi,
}

impl NimbusClient {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str) -> Result<T, SourceError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            id: REQUEST_ID,
            params: [],
        };
        let response: RpcResponse<T> = self.api.post_json("", &request).await?;
        response.into_result(method)
    }
}

#[async_trait]
impl CapabilitySource for NimbusClient {
    async fn version(&self) -> Result<String, SourceError> {
        self.call("getNodeVersion").await
    }

    async fn genesis_time(&self) -> Result<i64, SourceError> {
        Ok(NIMBUS_GENESIS_TIME)
    }

    async fn peer_count(&self) -> Result<i64, SourceError> {
        let peers: Vec<String> = self.call("getNetworkPeers").await?;
        Ok(peers.len() as i64)
    }

    async fn attestations_in_pool_count(&self) -> Result<i64, SourceError> {
        Err(SourceError::Unsupported)
    }

    async fn sync_status(&self) -> Result<bool, SourceError> {
        self.call("getSyncing").await
    }

    async fn chain_head(&self) -> Result<ChainHead, SourceError> {
        let head: Head = self.call("getChainHead").await?;
        Ok(head.into())
    }
}
