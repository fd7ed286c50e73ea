//! Memory usage watcher
//!
//! Scrapes the node's Prometheus endpoint and keeps the latest resident
//! memory sample. Until the first successful scrape there is no value.

use crate::prometheus::MetricFamilies;
use beaconstats_core::{BeaconStatsError, MemoryUsageSource, SourceError};
use parking_lot::Mutex;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between scrapes
pub const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Scrape attempts per poll before giving up until the next interval
pub const MEMORY_POLL_ATTEMPTS: u32 = 4;

/// Timeout of a single scrape
pub const MEMORY_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Family holding the process resident set size
pub const RESIDENT_MEMORY_METRIC: &str = "process_resident_memory_bytes";

/// Parse and check the address of a Prometheus endpoint
pub fn parse_metrics_url(address: &str) -> Result<Url, BeaconStatsError> {
    let invalid = |reason: String| BeaconStatsError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    Ok(url)
}

/// Pull the resident memory value out of a scrape body
pub fn extract_memory_usage(body: &str) -> Result<i64, SourceError> {
    MetricFamilies::parse(body)?
        .first_i64(RESIDENT_MEMORY_METRIC)
        .ok_or_else(|| SourceError::Parse(format!("{} not found", RESIDENT_MEMORY_METRIC)))
}

pub struct MemoryWatcher {
    client: Client,
    url: Url,
    poll_interval: Duration,
    latest: Mutex<Option<i64>>,
}

impl MemoryWatcher {
    pub fn new(metrics_url: &str) -> Result<Self, BeaconStatsError> {
        let url = parse_metrics_url(metrics_url)?;

        let client = Client::builder()
            .timeout(MEMORY_POLL_TIMEOUT)
            .pool_idle_timeout(MEMORY_POLL_INTERVAL * 2)
            .build()
            .map_err(|e| BeaconStatsError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            poll_interval: MEMORY_POLL_INTERVAL,
            latest: Mutex::new(None),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll until cancelled; the first poll runs immediately
    pub async fn run(&self, cancel: CancellationToken) {
        info!(url = %self.url, "Started polling metrics");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.poll() => {}
            }
        }

        info!("Stopped polling metrics");
    }

    /// One poll with retries. Returns whether a value was stored.
    pub async fn poll(&self) -> bool {
        for attempt in 1..=MEMORY_POLL_ATTEMPTS {
            match self.scrape().await {
                Ok(bytes) => {
                    debug!(bytes, "Sampled node memory usage");
                    *self.latest.lock() = Some(bytes);
                    return true;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to poll metrics");
                    if attempt < MEMORY_POLL_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(100 << attempt)).await;
                    }
                }
            }
        }
        false
    }

    async fn scrape(&self) -> Result<i64, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                path: self.url.path().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        extract_memory_usage(&body)
    }
}

impl MemoryUsageSource for MemoryWatcher {
    fn latest_memory_usage(&self) -> Option<i64> {
        *self.latest.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_memory_usage() {
        let body = "# TYPE process_resident_memory_bytes gauge\nprocess_resident_memory_bytes 104857600\n";
        assert_eq!(extract_memory_usage(body).unwrap(), 104_857_600);
    }

    #[test]
    fn test_extract_memory_usage_missing() {
        let body = "# TYPE libp2p_peers gauge\nlibp2p_peers 12\n";
        assert!(matches!(
            extract_memory_usage(body),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_no_value_before_first_scrape() {
        let watcher = MemoryWatcher::new("http://127.0.0.1:8008/metrics").unwrap();
        assert_eq!(watcher.latest_memory_usage(), None);
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            MemoryWatcher::new("not a url"),
            Err(BeaconStatsError::InvalidAddress { .. })
        ));
    }
}
