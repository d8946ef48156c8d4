use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    RateLimitError,
    AuthenticationError,
    ServerError,
    #[serde(other)]
    Unknown,
}

/// Error payload carried by upstream `error` events.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerError {
    #[serde(rename = "type", default = "unknown_error_type")]
    pub error_type: ApiErrorType,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
}

const fn unknown_error_type() -> ApiErrorType {
    ApiErrorType::Unknown
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP protocol error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream API error: {0:?}")]
    Api(ServerError),

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {after:?} waiting for {waiting_for}")]
    Timeout { waiting_for: String, after: Duration },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("{0}")]
    Execution(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid client event: {0}")]
    InvalidClientEvent(String),
}

impl Error {
    /// Whether the error means the underlying channel is gone.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
