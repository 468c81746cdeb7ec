use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Broad failure classes for session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A frame or payload that could not be encoded or decoded.
    MalformedInput,
    /// Bad configuration or a request the server rejected.
    ValidationFailure,
    /// Socket read/write failures. Delivered to every subscriber.
    TransportFailure,
    /// A subscriber fell behind and was disconnected.
    CapacityExceeded,
    /// The subscription or session is no longer usable.
    Closed,
}

/// Subscription client errors.
///
/// Foreign errors are kept as rendered strings so the same failure can be
/// cloned into every affected subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubsubError {
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("no pong received within {0:?}")]
    PongTimeout(Duration),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("subscription queue full ({0} pending results)")]
    CapacityExceeded(usize),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode notification: {0}")]
    Decode(String),

    #[error("receive cancelled")]
    Cancelled,

    #[error("subscription is closed")]
    Closed,
}

impl PubsubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PubsubError::Encode(_) | PubsubError::Decode(_) => ErrorKind::MalformedInput,
            PubsubError::InvalidUrl(_) | PubsubError::InvalidConfig(_) | PubsubError::Rpc { .. } => {
                ErrorKind::ValidationFailure
            }
            PubsubError::Connect(_)
            | PubsubError::Transport(_)
            | PubsubError::WriteTimeout(_)
            | PubsubError::PongTimeout(_)
            | PubsubError::ConnectionClosed => ErrorKind::TransportFailure,
            PubsubError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            PubsubError::Cancelled | PubsubError::Closed => ErrorKind::Closed,
        }
    }

    /// Whether the whole session is gone, not just one subscription.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::TransportFailure
    }
}

impl From<tungstenite::Error> for PubsubError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                PubsubError::ConnectionClosed
            }
            other => PubsubError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PubsubError {
    fn from(err: serde_json::Error) -> Self {
        PubsubError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for PubsubError {
    fn from(err: url::ParseError) -> Self {
        PubsubError::InvalidUrl(err.to_string())
    }
}
