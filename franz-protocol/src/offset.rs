//! Log positions.
//!
//! An offset is the byte position of a message inside a partition log. It
//! travels as an 8-byte big-endian integer in request frames and can be
//! rendered as a fixed-width 16 digit hex string for storage in systems that
//! cannot hold a full 64-bit integer.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Size of the wire form of an offset.
pub const OFFSET_WIRE_SIZE: usize = 8;

/// Width of the hex form of an offset.
const OFFSET_HEX_WIDTH: usize = OFFSET_WIRE_SIZE * 2;

/// A 64-bit unsigned position in a partition log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Parses the 8-byte big-endian wire form.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; OFFSET_WIRE_SIZE] = bytes.try_into().map_err(|_| {
            ProtocolError::InvalidOffset(format!(
                "wire form must be {} bytes, got {}",
                OFFSET_WIRE_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(raw)))
    }

    /// Parses a hex string of 1 to 16 digits, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > OFFSET_HEX_WIDTH {
            return Err(ProtocolError::InvalidOffset(format!(
                "hex offset must have 1 to {} digits: {:?}",
                OFFSET_HEX_WIDTH, s
            )));
        }

        let padded = format!("{:0>width$}", digits, width = OFFSET_HEX_WIDTH);
        let mut raw = [0u8; OFFSET_WIRE_SIZE];
        hex::decode_to_slice(&padded, &mut raw)
            .map_err(|e| ProtocolError::InvalidOffset(format!("{:?}: {}", s, e)))?;
        Ok(Self(u64::from_be_bytes(raw)))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn to_wire_bytes(&self) -> [u8; OFFSET_WIRE_SIZE] {
        self.0.to_be_bytes()
    }

    /// Returns the 16 digit lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_wire_bytes())
    }

    /// Returns the offset `bytes` further along the log.
    pub fn advance(&self, bytes: u64) -> Result<Self, ProtocolError> {
        self.0
            .checked_add(bytes)
            .map(Self)
            .ok_or(ProtocolError::OffsetOverflow {
                offset: self.0,
                delta: bytes,
            })
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts decimal, or hex when prefixed with `0x`.
impl FromStr for Offset {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") || s.starts_with("0X") {
            return Self::from_hex(s);
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| ProtocolError::InvalidOffset(format!("{:?}: {}", s, e)))
    }
}
