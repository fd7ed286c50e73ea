//! Session supervisor
//!
//! A session is one authenticated stretch of reporting:
//! handshake, then heartbeat, head watch and telemetry running side by side.
//! The first fatal error ends the session; a new one starts after
//! [`RECONNECT_BACKOFF`] unless shutdown was requested meanwhile.

use crate::metrics::{ClientMetrics, HealthState, SessionState};
use crate::server::{ConnectInfo, StatsServer};
use crate::telemetry::TelemetryReporter;
use crate::token::SessionToken;
use beaconstats_core::{
    subscribe_chain_heads, BeaconStatsError, CapabilitySource, MemoryUsageSource, Result,
    Severity, UpdateRateLimiter, CONNECT_RETRY_INTERVAL, HEARTBEAT_INTERVAL, HEAD_POLL_INTERVAL,
    RECONNECT_BACKOFF, TELEMETRY_INTERVAL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Timing and identity of the session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Name the node is listed under
    pub node_name: String,
    /// Version string of this client, sent on connect
    pub client_version: String,
    pub heartbeat_interval: Duration,
    pub telemetry_interval: Duration,
    pub reconnect_backoff: Duration,
    pub connect_retry_interval: Duration,
}

impl SessionSettings {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            client_version: format!("beaconstats-client/v{}", env!("CARGO_PKG_VERSION")),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            telemetry_interval: TELEMETRY_INTERVAL,
            reconnect_backoff: RECONNECT_BACKOFF,
            connect_retry_interval: CONNECT_RETRY_INTERVAL,
        }
    }
}

pub struct SessionManager {
    settings: SessionSettings,
    source: Arc<dyn CapabilitySource>,
    memory: Option<Arc<dyn MemoryUsageSource>>,
    server: Arc<dyn StatsServer>,
    token: Arc<SessionToken>,
    health: Arc<RwLock<HealthState>>,
    metrics: ClientMetrics,
}

impl SessionManager {
    pub fn new(
        settings: SessionSettings,
        source: Arc<dyn CapabilitySource>,
        server: Arc<dyn StatsServer>,
        token: Arc<SessionToken>,
    ) -> Self {
        let metrics = ClientMetrics::new(settings.node_name.clone());
        Self {
            settings,
            source,
            memory: None,
            server,
            token,
            health: Arc::new(RwLock::new(HealthState::default())),
            metrics,
        }
    }

    /// Report memory usage from `memory`
    pub fn with_memory_source(mut self, memory: Arc<dyn MemoryUsageSource>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Publish state changes into a shared health state
    pub fn with_health_state(mut self, health: Arc<RwLock<HealthState>>) -> Self {
        self.health = health;
        self
    }

    pub fn health_state(&self) -> Arc<RwLock<HealthState>> {
        self.health.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.health.read().await.state
    }

    /// Run sessions until `shutdown` is cancelled.
    ///
    /// Only a process-fatal error ends this early.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let result = self.supervise(&shutdown).await;
        self.set_state(SessionState::ShuttingDown).await;
        result
    }

    async fn supervise(&self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let session = shutdown.child_token();
            let result = self.run_session(&session).await;
            session.cancel();
            self.set_state(SessionState::Disconnected).await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if is_process_fatal(&e) => {
                    error!(error = %e, "Unrecoverable error, stopping");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Session failed");
                    self.metrics.record_session_restart();
                }
            }

            info!(
                delay_secs = self.settings.reconnect_backoff.as_secs(),
                "Retrying in {:?}", self.settings.reconnect_backoff
            );
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
        }
    }

    /// One session. Returns `Ok` only once `cancel` fires.
    async fn run_session(&self, cancel: &CancellationToken) -> Result<()> {
        self.set_state(SessionState::Handshaking).await;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = self.handshake() => result?,
        }

        self.set_state(SessionState::Active).await;
        info!("Successfully connected to stats server");

        let mut reporter = TelemetryReporter::new(
            self.source.clone(),
            self.memory.clone(),
            self.server.clone(),
            self.token.clone(),
            self.metrics.clone(),
        )
        .with_interval(self.settings.telemetry_interval);

        tokio::try_join!(
            self.send_heartbeats(cancel),
            self.watch_heads(cancel),
            reporter.run(cancel),
        )?;

        Ok(())
    }

    /// Connect (retrying while the server is unreachable), store the token
    /// and send the initial chain head
    async fn handshake(&self) -> Result<()> {
        info!("Getting beacon client version");
        let version = self.source.version().await?;
        info!(version = %version, "Got beacon client version");

        let genesis_time = self.source.genesis_time().await?;
        info!(genesis_time, "Got beacon client genesis time");

        let connect_info = ConnectInfo {
            name: self.settings.node_name.clone(),
            version,
            genesis_time,
            client_version: self.settings.client_version.clone(),
        };

        info!("Awaiting connection to stats server");
        let issued = loop {
            let token = self.token.get().await;
            match self.server.connect(&connect_info, token.as_deref()).await {
                Ok(issued) => break issued,
                Err(e) if e.is_unavailable() => {
                    debug!(error = %e, "Stats server unavailable, waiting");
                    tokio::time::sleep(self.settings.connect_retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        };

        if self.token.update(issued).await? {
            info!("Stored new session token");
        }

        info!("Getting chain head for initial feed");
        match self.source.chain_head().await {
            Ok(head) => {
                info!(head_slot = head.head_slot, "Got chain head");
                let token = self.token.get().await;
                self.server.chain_head(&head, token.as_deref()).await?;
                self.metrics.record_head_report(head.head_slot);
            }
            Err(e) => warn!(error = %e, "Failed to get chain head for initial feed"),
        }

        Ok(())
    }

    async fn send_heartbeats(&self, cancel: &CancellationToken) -> Result<()> {
        let period = self.settings.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            trace!("Sending heartbeat");
            let token = self.token.get().await;
            match self.server.heartbeat(token.as_deref()).await {
                Ok(()) => self.metrics.record_heartbeat(true),
                Err(e) => {
                    self.metrics.record_heartbeat(false);
                    return Err(e);
                }
            }
        }
    }

    /// Forward head changes, rate limited. A subscription that ends is
    /// replaced; only a failed report is fatal.
    async fn watch_heads(&self, cancel: &CancellationToken) -> Result<()> {
        let mut limiter = UpdateRateLimiter::new();

        while !cancel.is_cancelled() {
            info!("Setting up chain heads subscription");
            let mut subscription = match subscribe_chain_heads(self.source.clone(), cancel).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to chain heads");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(HEAD_POLL_INTERVAL) => continue,
                    }
                }
            };

            while let Some(head) = subscription.next().await {
                if !limiter.allow() {
                    debug!(head_slot = head.head_slot, "Chain head skipped due to rate limiting");
                    self.metrics.record_head_skipped();
                    continue;
                }

                let token = self.token.get().await;
                self.server.chain_head(&head, token.as_deref()).await?;
                self.metrics.record_head_report(head.head_slot);
                debug!(%head, "Reported chain head");
            }

            if cancel.is_cancelled() {
                break;
            }
            warn!("Chain heads subscription closed");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(HEAD_POLL_INTERVAL) => {}
            }
        }

        Ok(())
    }

    async fn set_state(&self, state: SessionState) {
        let mut health = self.health.write().await;
        if health.state != state {
            debug!(from = %health.state, to = %state, "Session state changed");
        }
        health.update(state);
        self.metrics.set_session_state(state);
    }
}

/// Whether `error` ends the process instead of just the session
pub fn is_process_fatal(error: &BeaconStatsError) -> bool {
    error.severity() == Severity::ProcessFatal
}
