//! Error types for the session layer

use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// No Chrome executable and no websocket endpoint configured.
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}
