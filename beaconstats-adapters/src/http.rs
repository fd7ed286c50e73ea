//! Thin JSON-over-HTTP helper shared by the REST adapters

use beaconstats_core::{BeaconStatsError, SourceError};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::trace;

/// REST endpoint of one beacon node
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BeaconStatsError> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BeaconStatsError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` (relative to the base URL) and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let body = self.get_text(path).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse(format!("{}: {}", path, e)))
    }

    /// GET `path` and return the raw body of a successful response
    pub async fn get_text(&self, path: &str) -> Result<String, SourceError> {
        let url = self.url(path)?;
        trace!(url = %url, "GET");
        self.send(path, self.client.get(url)).await
    }

    /// POST `body` as JSON to `path` and decode the JSON reply
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SourceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        trace!(url = %url, "POST");
        let body = self.send(path, self.client.post(url).json(body)).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse(format!("{}: {}", path, e)))
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::Request(format!("{}: {}", path, e)))
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<String, SourceError> {
        let response = request
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))
    }
}

/// Parse a node address, making sure relative paths join under it
pub fn parse_base_url(address: &str) -> Result<Url, BeaconStatsError> {
    let invalid = |reason: String| BeaconStatsError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let mut url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Parse an unsigned quantity written in decimal or `0x` hex
pub fn parse_quantity(raw: &str) -> Result<u64, SourceError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| SourceError::Parse(format!("invalid quantity `{}`: {}", raw, e)))
}

/// Deserialize a u64 that nodes encode either as a JSON number or a string
pub fn quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Number(u64),
        Text(String),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(n),
        Quantity::Text(s) => parse_quantity(&s).map_err(serde::de::Error::custom),
    }
}

/// A bare quantity body, as a JSON number or a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Quantity(#[serde(deserialize_with = "quantity")] pub u64);
