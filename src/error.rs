use crate::types::ZoneNumber;
use thiserror::Error;

/// Result type for HTD operations
pub type Result<T> = std::result::Result<T, HtdError>;

/// Errors that can occur when controlling HTD zones
#[derive(Error, Debug)]
pub enum HtdError {
    /// I/O error talking to the controller
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Controller did not answer in time
    #[error("Request timeout")]
    Timeout,

    /// Connection to the controller was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Controller answered with something that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other failure reported by a gateway implementation
    #[error("Gateway error: {0}")]
    Gateway(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Source name is not part of the configured source list
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Controller reported a source index the configured list cannot resolve
    #[error("Source index {index} out of range (1..={available})")]
    InvalidSourceIndex {
        /// 1-based index reported by the controller
        index: u8,
        /// Number of configured source names
        available: usize,
    },

    /// Zone number outside the supported range
    #[error("Invalid zone: {0}")]
    InvalidZone(ZoneNumber),

    /// Requested volume fraction is not a finite number
    #[error("Invalid volume: {0}")]
    InvalidVolume(f64),

    /// Zone has not been queried successfully yet
    #[error("Zone {0} has no state yet")]
    NoSnapshot(ZoneNumber),

    /// Persisted configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// State update receiver fell behind and missed updates
    #[error("Lagged by {0} updates")]
    Lagged(u64),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HtdError {
    /// Wrap an arbitrary gateway failure
    pub fn gateway(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HtdError::Gateway(err.into())
    }

    /// Whether this error came from talking to the controller rather than from
    /// local configuration or usage
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            HtdError::Io(_)
                | HtdError::Timeout
                | HtdError::ConnectionClosed
                | HtdError::InvalidResponse(_)
                | HtdError::Gateway(_)
        )
    }
}
