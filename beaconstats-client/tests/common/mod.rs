//! Hand-written mocks shared by the client integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use beaconstats_client::{ConnectInfo, SessionToken, StatsServer, TokenStore};
use beaconstats_core::{
    BeaconStatsError, CapabilitySource, ChainHead, HeadStream, MemoryUsageSource, Metric, Result,
    SourceError,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

pub const MIB: i64 = 1024 * 1024;

pub fn head(slot: u64) -> ChainHead {
    ChainHead {
        head_slot: slot,
        head_block_root: format!("0x{:064x}", slot),
        finalized_slot: slot.saturating_sub(64),
        finalized_block_root: "0xfinalized".to_string(),
        justified_slot: slot.saturating_sub(32),
        justified_block_root: "0xjustified".to_string(),
    }
}

/// Scripted answers. Each read takes the next one; the last is repeated.
/// An empty script answers `Unsupported`.
#[derive(Debug)]
pub struct Script<T> {
    answers: Mutex<VecDeque<std::result::Result<T, SourceError>>>,
}

impl<T: Clone> Script<T> {
    pub fn unsupported() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
        }
    }

    pub fn values(values: impl IntoIterator<Item = T>) -> Self {
        Self::answers(values.into_iter().map(Ok))
    }

    pub fn answers(answers: impl IntoIterator<Item = std::result::Result<T, SourceError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }

    pub fn next(&self) -> std::result::Result<T, SourceError> {
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers.front().cloned().unwrap_or(Err(SourceError::Unsupported))
        }
    }
}

/// Beacon node double
pub struct MockSource {
    pub version: Script<String>,
    pub genesis_time: Script<i64>,
    pub peers: Script<i64>,
    pub attestations: Script<i64>,
    pub syncing: Script<bool>,
    pub chain_head: Script<ChainHead>,
    /// Batches handed out by successive `open_head_stream` calls.
    /// `None` means the node has no native stream.
    pub streams: Option<Mutex<VecDeque<Vec<ChainHead>>>>,
    /// Delay before each streamed head
    pub stream_delay: Duration,
    pub stream_opens: AtomicUsize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            version: Script::values(["Lighthouse/v4.5.0".to_string()]),
            genesis_time: Script::values([1_606_824_023]),
            peers: Script::values([25]),
            attestations: Script::unsupported(),
            syncing: Script::values([false]),
            chain_head: Script::values([head(100)]),
            streams: None,
            stream_delay: Duration::from_secs(2),
            stream_opens: AtomicUsize::new(0),
        }
    }
}

impl MockSource {
    /// Serve `batches` as native head streams, one per `open_head_stream`.
    /// Once they run out the stream stays open without items.
    pub fn with_streams(mut self, batches: Vec<Vec<ChainHead>>) -> Self {
        self.streams = Some(Mutex::new(batches.into()));
        self
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilitySource for MockSource {
    async fn version(&self) -> std::result::Result<String, SourceError> {
        self.version.next()
    }

    async fn genesis_time(&self) -> std::result::Result<i64, SourceError> {
        self.genesis_time.next()
    }

    async fn peer_count(&self) -> std::result::Result<i64, SourceError> {
        self.peers.next()
    }

    async fn attestations_in_pool_count(&self) -> std::result::Result<i64, SourceError> {
        self.attestations.next()
    }

    async fn sync_status(&self) -> std::result::Result<bool, SourceError> {
        self.syncing.next()
    }

    async fn chain_head(&self) -> std::result::Result<ChainHead, SourceError> {
        self.chain_head.next()
    }

    async fn open_head_stream(&self) -> std::result::Result<HeadStream, SourceError> {
        let streams = self.streams.as_ref().ok_or(SourceError::Unsupported)?;
        self.stream_opens.fetch_add(1, Ordering::SeqCst);

        let delay = self.stream_delay;
        match streams.lock().unwrap().pop_front() {
            Some(batch) => Ok(futures::stream::iter(batch)
                .then(move |h| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok::<_, SourceError>(h)
                })
                .boxed()),
            None => Ok(futures::stream::pending::<std::result::Result<ChainHead, SourceError>>()
                .boxed()),
        }
    }
}

/// What the mock server should answer to `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehaviour {
    Accept,
    /// Reject the call (session-fatal)
    Reject,
    /// Fail with a configuration error (process-fatal)
    Misconfigured,
}

#[derive(Debug, Clone)]
pub struct Call<T> {
    pub at: Instant,
    pub token: Option<String>,
    pub value: T,
}

/// Stats server double recording every call
pub struct MockServer {
    pub issued_token: String,
    connect_behaviour: Mutex<ConnectBehaviour>,
    unavailable_connects: AtomicUsize,
    failing_heartbeats: AtomicUsize,
    fail_metrics: AtomicBool,
    pub connects: Mutex<Vec<Call<ConnectInfo>>>,
    pub heads: Mutex<Vec<Call<ChainHead>>>,
    pub heartbeats: Mutex<Vec<Call<bool>>>,
    pub metrics: Mutex<Vec<Call<Metric>>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self {
            issued_token: "issued-token".to_string(),
            connect_behaviour: Mutex::new(ConnectBehaviour::Accept),
            unavailable_connects: AtomicUsize::new(0),
            failing_heartbeats: AtomicUsize::new(0),
            fail_metrics: AtomicBool::new(false),
            connects: Mutex::new(Vec::new()),
            heads: Mutex::new(Vec::new()),
            heartbeats: Mutex::new(Vec::new()),
            metrics: Mutex::new(Vec::new()),
        }
    }
}

impl MockServer {
    pub fn set_connect_behaviour(&self, behaviour: ConnectBehaviour) {
        *self.connect_behaviour.lock().unwrap() = behaviour;
    }

    /// The next `count` connects fail as if the server were unreachable
    pub fn unavailable_for(&self, count: usize) {
        self.unavailable_connects.store(count, Ordering::SeqCst);
    }

    /// The next `count` heartbeats are rejected
    pub fn fail_heartbeats(&self, count: usize) {
        self.failing_heartbeats.store(count, Ordering::SeqCst);
    }

    pub fn fail_metrics(&self, fail: bool) {
        self.fail_metrics.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<Call<ConnectInfo>> {
        self.connects.lock().unwrap().clone()
    }

    pub fn heads(&self) -> Vec<ChainHead> {
        self.heads.lock().unwrap().iter().map(|c| c.value.clone()).collect()
    }

    pub fn heartbeats(&self) -> Vec<Call<bool>> {
        self.heartbeats.lock().unwrap().clone()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().iter().map(|c| c.value).collect()
    }

    fn call<T>(token: Option<&str>, value: T) -> Call<T> {
        Call {
            at: Instant::now(),
            token: token.map(str::to_string),
            value,
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StatsServer for MockServer {
    async fn connect(&self, info: &ConnectInfo, token: Option<&str>) -> Result<String> {
        self.connects
            .lock()
            .unwrap()
            .push(Self::call(token, info.clone()));

        if Self::take_one(&self.unavailable_connects) {
            return Err(BeaconStatsError::ServerUnavailable(
                "connection refused".to_string(),
            ));
        }

        let behaviour = *self.connect_behaviour.lock().unwrap();
        match behaviour {
            ConnectBehaviour::Accept => Ok(self.issued_token.clone()),
            ConnectBehaviour::Reject => Err(BeaconStatsError::Rpc {
                call: "Connect",
                message: "PermissionDenied: node banned".to_string(),
            }),
            ConnectBehaviour::Misconfigured => Err(BeaconStatsError::Configuration(
                "server rejected client version".to_string(),
            )),
        }
    }

    async fn chain_head(&self, head: &ChainHead, token: Option<&str>) -> Result<()> {
        self.heads
            .lock()
            .unwrap()
            .push(Self::call(token, head.clone()));
        Ok(())
    }

    async fn heartbeat(&self, token: Option<&str>) -> Result<()> {
        let fail = Self::take_one(&self.failing_heartbeats);
        self.heartbeats.lock().unwrap().push(Self::call(token, !fail));
        if fail {
            return Err(BeaconStatsError::Rpc {
                call: "Heartbeat",
                message: "Unauthenticated: unknown token".to_string(),
            });
        }
        Ok(())
    }

    async fn report_metric(&self, metric: Metric, token: Option<&str>) -> Result<()> {
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(BeaconStatsError::Rpc {
                call: "Peers",
                message: "Internal: storage down".to_string(),
            });
        }
        self.metrics.lock().unwrap().push(Self::call(token, metric));
        Ok(())
    }
}

/// Memory usage double
#[derive(Default)]
pub struct MockMemory {
    latest: Mutex<Option<i64>>,
}

impl MockMemory {
    pub fn set(&self, bytes: i64) {
        *self.latest.lock().unwrap() = Some(bytes);
    }
}

impl MemoryUsageSource for MockMemory {
    fn latest_memory_usage(&self) -> Option<i64> {
        *self.latest.lock().unwrap()
    }
}

/// A token store in a fresh temporary folder
pub fn temp_token(dir: &TempDir) -> Arc<SessionToken> {
    Arc::new(SessionToken::load(TokenStore::new(dir.path().join("token.dat"))).unwrap())
}
