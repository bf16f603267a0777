//! Client error types.

use franz_protocol::{BrokerErrorCode, ErrorKind, Offset, ProtocolError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O timeout")]
    Timeout,

    #[error("broker error: {0}")]
    Broker(BrokerErrorCode),

    #[error("message at offset {offset} does not fit in a fetch of {max_size} bytes")]
    MessageTooLarge { offset: Offset, max_size: u32 },
}

impl ClientError {
    /// Returns the failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::Timeout => {
                ErrorKind::Transport
            }
            ClientError::Protocol(e) => e.kind(),
            ClientError::Broker(_) => ErrorKind::Broker,
            ClientError::MessageTooLarge { .. } => ErrorKind::Protocol,
        }
    }

    /// Returns whether reconnecting and retrying from the last committed
    /// offset may succeed. Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::Broker(code) => matches!(code, BrokerErrorCode::Unknown(_)),
            _ => false,
        }
    }
}
