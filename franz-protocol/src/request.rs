//! Request frames.
//!
//! ```text
//! +----------+--------------+------------------+
//! | size:u32 | type:u16     | body             |
//! +----------+--------------+------------------+
//! ```
//!
//! `size` counts the type field and the body. Topics are encoded as a u16
//! length followed by UTF-8 bytes.

use crate::error::ProtocolError;
use crate::message::Message;
use crate::offset::Offset;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Request type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Produce,
    Fetch,
    MultiProduce,
    Offsets,
}

impl RequestType {
    pub fn id(&self) -> u16 {
        match self {
            RequestType::Produce => 0,
            RequestType::Fetch => 1,
            RequestType::MultiProduce => 3,
            RequestType::Offsets => 4,
        }
    }
}

/// A topic and partition pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = u16::try_from(self.topic.len()).map_err(|_| {
            ProtocolError::malformed(
                "topic",
                format!("{} bytes exceeds the u16 length field", self.topic.len()),
            )
        })?;
        buf.put_u16(len);
        buf.put_slice(self.topic.as_bytes());
        buf.put_u32(self.partition);
        Ok(())
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A request that can be framed and sent to a broker.
pub trait Request {
    fn request_type(&self) -> RequestType;

    /// Appends the body (everything after the type field).
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Encodes the complete request frame.
    fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(0);
        buf.put_u16(self.request_type().id());
        self.encode_body(&mut buf)?;

        let size = u32::try_from(buf.len() - 4).map_err(|_| {
            ProtocolError::malformed("request", format!("{} bytes", buf.len()))
        })?;
        buf[0..4].copy_from_slice(&size.to_be_bytes());
        Ok(buf)
    }
}

/// Fetch up to `max_size` bytes of messages starting at `offset`.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub target: TopicPartition,
    pub offset: Offset,
    pub max_size: u32,
}

impl Request for FetchRequest {
    fn request_type(&self) -> RequestType {
        RequestType::Fetch
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.target.encode(buf)?;
        buf.put_slice(&self.offset.to_wire_bytes());
        buf.put_u32(self.max_size);
        Ok(())
    }
}

/// Append messages to one partition.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub target: TopicPartition,
    pub messages: Vec<Message>,
}

impl ProduceRequest {
    /// Size of the encoded message set.
    pub fn message_set_size(&self) -> usize {
        self.messages.iter().map(Message::wire_size).sum()
    }
}

impl Request for ProduceRequest {
    fn request_type(&self) -> RequestType {
        RequestType::Produce
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.target.encode(buf)?;
        let set_size = u32::try_from(self.message_set_size()).map_err(|_| {
            ProtocolError::malformed(
                "message set",
                format!("{} bytes", self.message_set_size()),
            )
        })?;
        buf.put_u32(set_size);
        for message in &self.messages {
            message.write_to(buf);
        }
        Ok(())
    }
}

/// Append messages to several partitions in one round trip.
#[derive(Debug, Clone)]
pub struct MultiProduceRequest {
    pub requests: Vec<ProduceRequest>,
}

impl Request for MultiProduceRequest {
    fn request_type(&self) -> RequestType {
        RequestType::MultiProduce
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let count = u16::try_from(self.requests.len()).map_err(|_| {
            ProtocolError::malformed(
                "multi-produce request",
                format!("{} targets", self.requests.len()),
            )
        })?;
        buf.put_u16(count);
        for request in &self.requests {
            request.encode_body(buf)?;
        }
        Ok(())
    }
}

/// Point in time an offsets request asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetTime {
    Latest,
    Earliest,
    /// Milliseconds since the epoch.
    Before(i64),
}

impl OffsetTime {
    pub fn as_i64(&self) -> i64 {
        match self {
            OffsetTime::Latest => -1,
            OffsetTime::Earliest => -2,
            OffsetTime::Before(ms) => *ms,
        }
    }
}

/// Ask for up to `max_offsets` segment start offsets before `time`.
#[derive(Debug, Clone)]
pub struct OffsetsRequest {
    pub target: TopicPartition,
    pub time: OffsetTime,
    pub max_offsets: u32,
}

impl Request for OffsetsRequest {
    fn request_type(&self) -> RequestType {
        RequestType::Offsets
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.target.encode(buf)?;
        buf.put_i64(self.time.as_i64());
        buf.put_u32(self.max_offsets);
        Ok(())
    }
}
