//! Stats server client
//!
//! [`StatsServer`] is the set of logical calls the session issues.
//! [`GrpcStatsServer`] implements it over the eth2stats gRPC services.

use crate::config::ServerSettings;
use async_trait::async_trait;
use beaconstats_core::{BeaconStatsError, ChainHead, Metric, Result};
use beaconstats_protocol::{
    AttestationsRequest, ChainHeadRequest, ConnectRequest, Eth2StatsClient, HeartbeatRequest,
    MemoryUsageRequest, PeersRequest, SyncingRequest, TelemetryClient, TOKEN_METADATA_KEY,
};
use std::time::Duration;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Code;
use tracing::{debug, info};

/// Deadline applied to every call except `Connect`
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection establishment timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the node announces itself as on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub name: String,
    pub version: String,
    pub genesis_time: i64,
    pub client_version: String,
}

/// Logical calls to the aggregation server.
///
/// Every call after `connect` carries the session token.
#[async_trait]
pub trait StatsServer: Send + Sync {
    /// Register (or resume with `token`) and return the session token to use
    async fn connect(&self, info: &ConnectInfo, token: Option<&str>) -> Result<String>;

    async fn chain_head(&self, head: &ChainHead, token: Option<&str>) -> Result<()>;

    async fn heartbeat(&self, token: Option<&str>) -> Result<()>;

    async fn report_metric(&self, metric: Metric, token: Option<&str>) -> Result<()>;
}

/// gRPC implementation of [`StatsServer`]
#[derive(Debug, Clone)]
pub struct GrpcStatsServer {
    stats: Eth2StatsClient<Channel>,
    telemetry: TelemetryClient<Channel>,
}

impl GrpcStatsServer {
    /// Set up a lazily connected channel to the stats server.
    ///
    /// Nothing is dialled here; while the server is unreachable calls fail
    /// with [`BeaconStatsError::ServerUnavailable`].
    pub fn new(settings: &ServerSettings) -> Result<Self> {
        let uri = settings.endpoint_uri();
        let invalid = |reason: String| BeaconStatsError::InvalidAddress {
            address: settings.address.clone(),
            reason,
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| invalid(e.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Some(Duration::from_secs(60)));

        if uri.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| invalid(e.to_string()))?;
        }

        info!(uri = %uri, tls = uri.starts_with("https://"), "Setting up stats server connection");
        let channel = endpoint.connect_lazy();

        Ok(Self {
            stats: Eth2StatsClient::new(channel.clone()),
            telemetry: TelemetryClient::new(channel),
        })
    }
}

/// Build a deadline-bound request carrying the session token as metadata
fn authorized<T>(inner: T, token: Option<&str>) -> Result<tonic::Request<T>> {
    let mut request = with_token(inner, token)?;
    request.set_timeout(RPC_TIMEOUT);
    Ok(request)
}

/// Build a request without a deadline. `Connect` waits for the server
/// for as long as it takes.
fn with_token<T>(inner: T, token: Option<&str>) -> Result<tonic::Request<T>> {
    let mut request = tonic::Request::new(inner);
    if let Some(token) = token {
        let value = MetadataValue::try_from(token).map_err(|e| {
            BeaconStatsError::Internal(format!("session token is not valid metadata: {}", e))
        })?;
        request.metadata_mut().insert(TOKEN_METADATA_KEY, value);
    }
    Ok(request)
}

/// Classify a failed call
pub fn status_to_error(call: &'static str, status: tonic::Status) -> BeaconStatsError {
    match status.code() {
        Code::Unavailable => BeaconStatsError::ServerUnavailable(status.message().to_string()),
        code => BeaconStatsError::Rpc {
            call,
            message: format!("{:?}: {}", code, status.message()),
        },
    }
}

/// Classify a failed `Connect`. A handshake that never got an answer
/// means the server is not reachable yet, not that it refused the node.
pub fn connect_status_to_error(status: tonic::Status) -> BeaconStatsError {
    match status.code() {
        Code::DeadlineExceeded | Code::Cancelled => {
            BeaconStatsError::ServerUnavailable(status.message().to_string())
        }
        _ => status_to_error("Connect", status),
    }
}

#[async_trait]
impl StatsServer for GrpcStatsServer {
    async fn connect(&self, info: &ConnectInfo, token: Option<&str>) -> Result<String> {
        let request = with_token(
            ConnectRequest {
                name: info.name.clone(),
                version: info.version.clone(),
                genesis_time: info.genesis_time,
                eth2stats_version: info.client_version.clone(),
            },
            token,
        )?;

        let response = self
            .stats
            .clone()
            .connect(request)
            .await
            .map_err(connect_status_to_error)?;

        Ok(response.into_inner().token)
    }

    async fn chain_head(&self, head: &ChainHead, token: Option<&str>) -> Result<()> {
        let request = authorized(
            ChainHeadRequest {
                head_slot: head.head_slot,
                head_block_root: head.head_block_root.clone(),
                finalized_slot: head.finalized_slot,
                finalized_block_root: head.finalized_block_root.clone(),
                justified_slot: head.justified_slot,
                justified_block_root: head.justified_block_root.clone(),
            },
            token,
        )?;

        self.stats
            .clone()
            .chain_head(request)
            .await
            .map_err(|s| status_to_error("ChainHead", s))?;
        Ok(())
    }

    async fn heartbeat(&self, token: Option<&str>) -> Result<()> {
        let request = authorized(HeartbeatRequest {}, token)?;
        self.stats
            .clone()
            .heartbeat(request)
            .await
            .map_err(|s| status_to_error("Heartbeat", s))?;
        Ok(())
    }

    async fn report_metric(&self, metric: Metric, token: Option<&str>) -> Result<()> {
        debug!(%metric, "Reporting telemetry");
        let mut client = self.telemetry.clone();

        let result = match metric {
            Metric::Peers(peers) => client
                .peers(authorized(PeersRequest { peers }, token)?)
                .await
                .map_err(|s| status_to_error("Peers", s)),
            Metric::AttestationsInPool(attestations_in_pool) => client
                .attestations(authorized(
                    AttestationsRequest {
                        attestations_in_pool,
                    },
                    token,
                )?)
                .await
                .map_err(|s| status_to_error("Attestations", s)),
            Metric::Syncing(syncing) => client
                .syncing(authorized(SyncingRequest { syncing }, token)?)
                .await
                .map_err(|s| status_to_error("Syncing", s)),
            Metric::MemoryUsage(memory_usage) => client
                .memory_usage(authorized(MemoryUsageRequest { memory_usage }, token)?)
                .await
                .map_err(|s| status_to_error("MemoryUsage", s)),
        };

        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconstats_core::Severity;

    #[test]
    fn test_status_mapping() {
        let err = status_to_error("Connect", tonic::Status::unavailable("connection refused"));
        assert!(err.is_unavailable());
        assert_eq!(err.severity(), Severity::Retryable);

        let err = status_to_error("Heartbeat", tonic::Status::unauthenticated("bad token"));
        match &err {
            BeaconStatsError::Rpc { call, message } => {
                assert_eq!(*call, "Heartbeat");
                assert!(message.contains("bad token"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.severity(), Severity::SessionFatal);
    }

    #[test]
    fn test_unanswered_connect_is_unavailable() {
        let err = connect_status_to_error(tonic::Status::deadline_exceeded("timeout expired"));
        assert!(err.is_unavailable());
        assert_eq!(err.severity(), Severity::Retryable);

        let err = connect_status_to_error(tonic::Status::cancelled("h2 stream reset"));
        assert_eq!(err.severity(), Severity::Retryable);

        let err = connect_status_to_error(tonic::Status::permission_denied("node banned"));
        assert!(matches!(err, BeaconStatsError::Rpc { call: "Connect", .. }));
        assert_eq!(err.severity(), Severity::SessionFatal);
    }

    #[test]
    fn test_only_connect_has_no_deadline() {
        let connect = with_token(HeartbeatRequest {}, Some("abc123")).unwrap();
        assert!(connect.metadata().get("grpc-timeout").is_none());
        assert_eq!(
            connect
                .metadata()
                .get(TOKEN_METADATA_KEY)
                .and_then(|v| v.to_str().ok()),
            Some("abc123")
        );

        let heartbeat = authorized(HeartbeatRequest {}, None).unwrap();
        assert!(heartbeat.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn test_authorized_request_carries_token() {
        let request = authorized(HeartbeatRequest {}, Some("abc123")).unwrap();
        assert_eq!(
            request
                .metadata()
                .get(TOKEN_METADATA_KEY)
                .and_then(|v| v.to_str().ok()),
            Some("abc123")
        );

        let anonymous = authorized(HeartbeatRequest {}, None).unwrap();
        assert!(anonymous.metadata().get(TOKEN_METADATA_KEY).is_none());

        assert!(authorized(HeartbeatRequest {}, Some("line\nbreak")).is_err());
    }

    #[tokio::test]
    async fn test_new_is_lazy() {
        // Nothing listens here; construction must not dial
        let settings = ServerSettings {
            address: "127.0.0.1:1".to_string(),
            tls: false,
            node_name: "test".to_string(),
        };
        assert!(GrpcStatsServer::new(&settings).is_ok());

        let tls = ServerSettings {
            address: "stats.example.org:443".to_string(),
            tls: true,
            node_name: "test".to_string(),
        };
        assert!(GrpcStatsServer::new(&tls).is_ok());
    }
}
