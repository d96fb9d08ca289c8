use std::time::Duration;
use thiserror::Error;

/// Errors talking to the vulcand API
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid settings for middleware {kind}: {source}")]
    InvalidMiddleware {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from one reconciliation pass
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to split key {0:?} in the format <namespace>/<name>")]
    InvalidKey(String),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl ReconcileError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::InvalidKey(_) => "invalid_key",
            ReconcileError::Proxy(ProxyError::Timeout { .. }) => "timeout",
            ReconcileError::Proxy(_) => "proxy",
        }
    }
}
