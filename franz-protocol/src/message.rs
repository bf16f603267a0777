//! Message framing.
//!
//! ```text
//! magic 0:  size:u32 | magic:u8=0 |                  crc32:u32 | payload
//! magic 1:  size:u32 | magic:u8=1 | compression:u8 | crc32:u32 | payload
//! ```
//!
//! `size` counts every byte after the size field. The CRC32 covers the payload
//! exactly as it appears on the wire, so for a compressed message it is the
//! checksum of the gzip container.
//!
//! A gzip message never carries the producer's payload directly: the payload
//! is first framed as an uncompressed message and that framed form is what
//! gets compressed. Decoding undoes exactly one level of this wrapping.

use crate::compression::{self, Compression};
use crate::error::ProtocolError;
use crate::offset::Offset;
use crate::MAX_MESSAGE_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in front of every message.
pub const LENGTH_PREFIX_SIZE: usize = 4;

const CRC_SIZE: usize = 4;

/// Message frame format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// No compression attribute.
    V0,
    /// Carries a compression attribute byte.
    V1,
}

impl Magic {
    pub fn byte(&self) -> u8 {
        match self {
            Magic::V0 => 0,
            Magic::V1 => 1,
        }
    }

    /// Bytes between the length prefix and the payload.
    pub fn header_size(&self) -> usize {
        match self {
            Magic::V0 => 1 + CRC_SIZE,
            Magic::V1 => 2 + CRC_SIZE,
        }
    }
}

impl TryFrom<u8> for Magic {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Magic::V0),
            1 => Ok(Magic::V1),
            other => Err(ProtocolError::UnknownMagic(other)),
        }
    }
}

/// One broker log record.
///
/// For uncompressed messages `payload` and `wire_payload` are the same shared
/// buffer. For gzip messages `wire_payload` is the gzip container and
/// `payload` is the unwrapped data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    offset: Offset,
    magic: Magic,
    compression: Compression,
    checksum: u32,
    payload: Bytes,
    wire_payload: Bytes,
    inner: Vec<Message>,
}

impl Message {
    /// Creates an uncompressed message.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            offset: Offset::ZERO,
            magic: Magic::V1,
            compression: Compression::None,
            checksum: crc32fast::hash(&payload),
            wire_payload: payload.clone(),
            payload,
            inner: Vec::new(),
        }
    }

    /// Creates a message carrying `payload` with the given codec.
    pub fn encode(payload: impl Into<Bytes>, codec: Compression) -> Result<Self, ProtocolError> {
        match codec {
            Compression::None => {
                let message = Self::new(payload);
                message.check_size()?;
                Ok(message)
            }
            Compression::Gzip | Compression::Snappy => Self::wrap(vec![Self::new(payload)], codec),
        }
    }

    /// Frames `inner` as a message set and compresses it into one message.
    ///
    /// Every inner message must be uncompressed.
    pub fn wrap(inner: Vec<Message>, codec: Compression) -> Result<Self, ProtocolError> {
        match codec {
            Compression::None => {
                return Err(ProtocolError::malformed(
                    "message set",
                    "uncompressed messages cannot wrap other messages",
                ))
            }
            Compression::Snappy => return Err(ProtocolError::Unsupported("snappy compression")),
            Compression::Gzip => {}
        }
        if inner.is_empty() {
            return Err(ProtocolError::malformed(
                "message set",
                "nothing to compress",
            ));
        }
        if inner.iter().any(|m| m.compression != Compression::None) {
            return Err(ProtocolError::NestedCompression);
        }

        let framed_len: usize = inner.iter().map(Message::wire_size).sum();
        if framed_len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: framed_len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut framed = BytesMut::with_capacity(framed_len);
        for message in &inner {
            message.write_to(&mut framed);
        }
        let wire_payload = compression::gzip(&framed)?;

        let message = Self {
            offset: Offset::ZERO,
            magic: Magic::V1,
            compression: codec,
            checksum: crc32fast::hash(&wire_payload),
            payload: concat_payloads(&inner),
            wire_payload,
            inner,
        };
        message.check_size()?;
        Ok(message)
    }

    /// Decodes one length-prefixed message from the front of `buf`.
    ///
    /// When `buf` ends before the message does, the result is
    /// [`ProtocolError::Truncated`] and `buf` is left untouched, so the caller
    /// can append more bytes and try again.
    pub fn decode(buf: &mut Bytes, offset: Offset) -> Result<Self, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Err(ProtocolError::Truncated {
                needed: LENGTH_PREFIX_SIZE,
                available: buf.len(),
            });
        }
        let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if size > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if buf.len() - LENGTH_PREFIX_SIZE < size {
            return Err(ProtocolError::Truncated {
                needed: LENGTH_PREFIX_SIZE + size,
                available: buf.len(),
            });
        }
        buf.advance(LENGTH_PREFIX_SIZE);
        Self::decode_body(buf.split_to(size), offset)
    }

    /// Decodes a message from the bytes that follow its length prefix.
    pub fn decode_body(body: Bytes, offset: Offset) -> Result<Self, ProtocolError> {
        decode_framed(body, offset, false)
    }

    /// Appends the wire form of this message to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_size());
        buf.put_u32(self.size() as u32);
        buf.put_u8(self.magic.byte());
        if self.magic == Magic::V1 {
            buf.put_u8(self.compression.code());
        }
        buf.put_u32(self.checksum);
        buf.put_slice(&self.wire_payload);
    }

    /// Returns the wire form of this message.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Value of the length prefix: every byte after it.
    pub fn size(&self) -> usize {
        self.magic.header_size() + self.wire_payload.len()
    }

    /// Bytes this message occupies on the wire, length prefix included.
    ///
    /// This is the distance from this message's offset to the next one.
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.size()
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn magic(&self) -> Magic {
        self.magic
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// The decoded payload. For a compressed message holding several inner
    /// messages this is their payloads concatenated in order.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The payload as it appears on the wire.
    pub fn wire_payload(&self) -> &Bytes {
        &self.wire_payload
    }

    /// Inner messages of a compressed message; empty when uncompressed.
    pub fn inner(&self) -> &[Message] {
        &self.inner
    }

    pub fn is_compressed(&self) -> bool {
        self.compression != Compression::None
    }

    /// Payloads of the individual records carried by this message, in order.
    pub fn payloads(&self) -> Vec<Bytes> {
        if self.inner.is_empty() {
            vec![self.payload.clone()]
        } else {
            self.inner.iter().map(|m| m.payload.clone()).collect()
        }
    }

    fn check_size(&self) -> Result<(), ProtocolError> {
        if self.size() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.size(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}

/// Decodes a message body. `nested` is set while unwrapping a gzip message;
/// a second level of compression is rejected.
fn decode_framed(body: Bytes, offset: Offset, nested: bool) -> Result<Message, ProtocolError> {
    let magic_byte = *body
        .first()
        .ok_or_else(|| ProtocolError::malformed("message", "empty body"))?;
    let magic = Magic::try_from(magic_byte)?;
    let header_size = magic.header_size();
    if body.len() < header_size {
        return Err(ProtocolError::malformed(
            "message",
            format!("{} bytes is shorter than the {} byte header", body.len(), header_size),
        ));
    }

    let compression = match magic {
        Magic::V0 => Compression::None,
        Magic::V1 => Compression::try_from(body[1])?,
    };
    compression.ensure_supported()?;

    let crc_at = header_size - CRC_SIZE;
    let checksum = u32::from_be_bytes([
        body[crc_at],
        body[crc_at + 1],
        body[crc_at + 2],
        body[crc_at + 3],
    ]);
    let wire_payload = body.slice(header_size..);

    // Checked over the wire form before anything is parsed out of it.
    let actual = crc32fast::hash(&wire_payload);
    if actual != checksum {
        return Err(ProtocolError::ChecksumMismatch {
            what: "message",
            expected: checksum,
            actual,
        });
    }

    let (payload, inner) = match compression {
        Compression::None => (wire_payload.clone(), Vec::new()),
        Compression::Gzip => {
            if nested {
                return Err(ProtocolError::NestedCompression);
            }
            let inner = decode_inner_set(compression::gunzip(&wire_payload)?)?;
            (concat_payloads(&inner), inner)
        }
        Compression::Snappy => return Err(ProtocolError::Unsupported("snappy compression")),
    };

    Ok(Message {
        offset,
        magic,
        compression,
        checksum,
        payload,
        wire_payload,
        inner,
    })
}

/// Decodes the uncompressed message set inside a gzip container.
fn decode_inner_set(mut data: Bytes) -> Result<Vec<Message>, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::malformed(
            "compressed message set",
            "no inner messages",
        ));
    }

    let mut inner = Vec::new();
    while data.has_remaining() {
        if data.remaining() < LENGTH_PREFIX_SIZE {
            return Err(ProtocolError::malformed(
                "compressed message set",
                format!("{} trailing bytes", data.remaining()),
            ));
        }
        let size = data.get_u32() as usize;
        if size > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if data.remaining() < size {
            return Err(ProtocolError::malformed(
                "compressed message set",
                format!("inner message declares {} bytes, {} left", size, data.remaining()),
            ));
        }
        let body = data.split_to(size);
        inner.push(decode_framed(body, Offset::ZERO, true)?);
    }
    Ok(inner)
}

fn concat_payloads(inner: &[Message]) -> Bytes {
    if let [single] = inner {
        return single.payload.clone();
    }
    let mut buf = BytesMut::with_capacity(inner.iter().map(|m| m.payload.len()).sum());
    for message in inner {
        buf.put_slice(&message.payload);
    }
    buf.freeze()
}
