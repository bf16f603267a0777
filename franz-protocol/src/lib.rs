//! # franz-protocol
//!
//! Wire protocol implementation for the 0.7 log broker protocol.
//!
//! This crate provides:
//! - Message framing (magic 0 and 1) with CRC32 validation
//! - Gzip message wrapping and a validating gzip container parser
//! - Portable 64-bit offsets
//! - Request frames and response headers

pub mod compression;
pub mod error;
pub mod message;
pub mod offset;
pub mod request;
pub mod response;

pub use compression::Compression;
pub use error::{BrokerErrorCode, ErrorKind, ProtocolError};
pub use message::{Magic, Message, LENGTH_PREFIX_SIZE};
pub use offset::Offset;
pub use request::{
    FetchRequest, MultiProduceRequest, OffsetTime, OffsetsRequest, ProduceRequest, Request,
    RequestType, TopicPartition,
};
pub use response::{ResponseHeader, RESPONSE_HEADER_SIZE};

/// Default broker port.
pub const DEFAULT_PORT: u16 = 9092;

/// Maximum size of a single message (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
