//! Protocol error types and broker error codes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    #[error("offset overflow: {offset} + {delta} does not fit in 64 bits")]
    OffsetOverflow { offset: u64, delta: u64 },

    #[error("unknown magic byte: {0}")]
    UnknownMagic(u8),

    #[error("unknown compression code: {0}")]
    UnknownCompression(u8),

    #[error("invalid gzip signature: {0:#04x} {1:#04x}")]
    InvalidGzipMagic(u8, u8),

    #[error("invalid gzip flags: {0:#04x}")]
    InvalidGzipFlags(u8),

    #[error("invalid gzip compression method: {0}")]
    InvalidGzipMethod(u8),

    #[error("compressed message nested inside a compressed message")]
    NestedCompression,

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("{what} CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        what: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("{what} size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("truncated input: {needed} bytes needed, {available} available")]
    Truncated { needed: usize, available: usize },
}

impl ProtocolError {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// Returns the failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::InvalidOffset(_) | ProtocolError::OffsetOverflow { .. } => {
                ErrorKind::Format
            }
            ProtocolError::ChecksumMismatch { .. } | ProtocolError::SizeMismatch { .. } => {
                ErrorKind::Checksum
            }
            ProtocolError::Unsupported(_) => ErrorKind::Unsupported,
            ProtocolError::UnknownMagic(_)
            | ProtocolError::UnknownCompression(_)
            | ProtocolError::InvalidGzipMagic(..)
            | ProtocolError::InvalidGzipFlags(_)
            | ProtocolError::InvalidGzipMethod(_)
            | ProtocolError::NestedCompression
            | ProtocolError::Malformed { .. }
            | ProtocolError::MessageTooLarge { .. }
            | ProtocolError::Compression(_) => ErrorKind::Protocol,
            ProtocolError::Truncated { .. } => ErrorKind::EndOfStream,
        }
    }
}

/// Coarse classification of every outcome a consumer can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed offset representation.
    Format,
    /// Unknown magic, bad gzip container, unrecognized codes.
    Protocol,
    /// Message CRC, gzip header CRC or gzip footer mismatch.
    Checksum,
    /// Defined by the format but not implemented here.
    Unsupported,
    /// The input ended before a complete message. Streaming iteration
    /// reports this as `Ok(None)` instead of an error.
    EndOfStream,
    /// The underlying connection failed or timed out.
    Transport,
    /// The broker answered with a non-zero error code.
    Broker,
}

/// Error codes carried in the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerErrorCode {
    NoError,
    OffsetOutOfRange,
    InvalidMessage,
    WrongPartition,
    InvalidFetchSize,
    /// `-1`, or any code this client does not know; the raw value is kept.
    Unknown(i16),
}

impl BrokerErrorCode {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => BrokerErrorCode::NoError,
            1 => BrokerErrorCode::OffsetOutOfRange,
            2 => BrokerErrorCode::InvalidMessage,
            3 => BrokerErrorCode::WrongPartition,
            4 => BrokerErrorCode::InvalidFetchSize,
            other => BrokerErrorCode::Unknown(other),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            BrokerErrorCode::NoError => 0,
            BrokerErrorCode::OffsetOutOfRange => 1,
            BrokerErrorCode::InvalidMessage => 2,
            BrokerErrorCode::WrongPartition => 3,
            BrokerErrorCode::InvalidFetchSize => 4,
            BrokerErrorCode::Unknown(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BrokerErrorCode::NoError)
    }
}

impl fmt::Display for BrokerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerErrorCode::NoError => write!(f, "NO_ERROR"),
            BrokerErrorCode::OffsetOutOfRange => write!(f, "OFFSET_OUT_OF_RANGE"),
            BrokerErrorCode::InvalidMessage => write!(f, "INVALID_MESSAGE"),
            BrokerErrorCode::WrongPartition => write!(f, "WRONG_PARTITION"),
            BrokerErrorCode::InvalidFetchSize => write!(f, "INVALID_FETCH_SIZE"),
            BrokerErrorCode::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}
