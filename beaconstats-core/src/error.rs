//! Error types for beaconstats
//!
//! Two layers:
//! - [`SourceError`] is what a beacon node adapter returns for a single read.
//!   `Unsupported` is a distinguished outcome, not a failure.
//! - [`BeaconStatsError`] is the unified error for everything above the
//!   adapters. Its [`Severity`] decides how the session supervisor reacts.

use thiserror::Error;

/// Result type alias for beaconstats operations
pub type Result<T> = std::result::Result<T, BeaconStatsError>;

/// Outcome of a failed read from a beacon node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The backend cannot provide this value at all
    #[error("Feature is not available")]
    Unsupported,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Node responded with status {status}: {path}")]
    Status { status: u16, path: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Head stream failed: {0}")]
    Stream(String),
}

impl SourceError {
    /// Whether this is the "backend cannot provide this" marker
    pub fn is_unsupported(&self) -> bool {
        matches!(self, SourceError::Unsupported)
    }
}

/// How the session supervisor must react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Absorbed where it happens and retried on the next cycle
    Retryable,
    /// Tears down the current session; reconnect after backoff
    SessionFatal,
    /// Stops the process; retrying cannot help
    ProcessFatal,
}

/// Unified error type for beaconstats
#[derive(Error, Debug)]
pub enum BeaconStatsError {
    // ===== Beacon Node Errors =====
    #[error("Beacon node error: {0}")]
    Source(#[from] SourceError),

    // ===== Stats Server Errors =====
    #[error("Stats server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Stats server call `{call}` failed: {message}")]
    Rpc { call: &'static str, message: String },

    // ===== Persistence Errors =====
    #[error("Token store error: {0}")]
    TokenStore(#[from] std::io::Error),

    // ===== Configuration Errors =====
    #[error("Unknown beacon node type: {0}")]
    UnknownBackend(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BeaconStatsError {
    /// Classify this error for the session supervisor
    pub fn severity(&self) -> Severity {
        match self {
            BeaconStatsError::Source(_) | BeaconStatsError::ServerUnavailable(_) => {
                Severity::Retryable
            }
            BeaconStatsError::Rpc { .. }
            | BeaconStatsError::TokenStore(_)
            | BeaconStatsError::Internal(_) => Severity::SessionFatal,
            BeaconStatsError::UnknownBackend(_)
            | BeaconStatsError::InvalidAddress { .. }
            | BeaconStatsError::Configuration(_) => Severity::ProcessFatal,
        }
    }

    /// Whether the stats server could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BeaconStatsError::ServerUnavailable(_))
    }
}
