//! Response framing.
//!
//! ```text
//! +----------+----------------+-------------------+
//! | size:u32 | error_code:i16 | body              |
//! +----------+----------------+-------------------+
//! ```
//!
//! `size` counts the error code and the body. A fetch response body is a
//! message set; an offsets response body is `count:u32 | offset:u64 * count`.

use crate::error::{BrokerErrorCode, ProtocolError};
use crate::offset::{Offset, OFFSET_WIRE_SIZE};
use bytes::Buf;

/// Size of the response header on the wire.
pub const RESPONSE_HEADER_SIZE: usize = 6;

/// Parsed response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Bytes of body that follow the header.
    pub body_len: u32,
    pub error: BrokerErrorCode,
}

impl ResponseHeader {
    pub fn decode(raw: &[u8; RESPONSE_HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let size = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if size < 2 {
            return Err(ProtocolError::malformed(
                "response header",
                format!("size {} cannot hold the error code", size),
            ));
        }
        let code = i16::from_be_bytes([raw[4], raw[5]]);
        Ok(Self {
            body_len: size - 2,
            error: BrokerErrorCode::from_code(code),
        })
    }
}

/// Decodes the body of an offsets response.
pub fn decode_offsets(body: &mut impl Buf) -> Result<Vec<Offset>, ProtocolError> {
    if body.remaining() < 4 {
        return Err(ProtocolError::malformed(
            "offsets response",
            "missing offset count",
        ));
    }
    let count = body.get_u32() as usize;
    if (body.remaining() as u64) < count as u64 * OFFSET_WIRE_SIZE as u64 {
        return Err(ProtocolError::malformed(
            "offsets response",
            format!("{} offsets declared, {} bytes left", count, body.remaining()),
        ));
    }
    Ok((0..count).map(|_| Offset::new(body.get_u64())).collect())
}
