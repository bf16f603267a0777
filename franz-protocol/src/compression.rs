//! Compression codecs and the gzip container.
//!
//! Only gzip is implemented. The container is parsed by hand rather than
//! through a gzip reader so that every optional header field is validated
//! against the format and the footer checks are reported precisely:
//!
//! ```text
//! +----+----+----+-----+-------+-----+----+
//! | 1f | 8b | CM | FLG | MTIME | XFL | OS |   10 bytes
//! +----+----+----+-----+-------+-----+----+
//! [FEXTRA: xlen:u16le | xlen bytes]
//! [FNAME: zero-terminated] [FCOMMENT: zero-terminated]
//! [FHCRC: crc16:u16le]
//! compressed blocks ...
//! +-------+-------+
//! | CRC32 | ISIZE |   8 bytes, little-endian
//! +-------+-------+
//! ```

use crate::error::ProtocolError;
use crate::MAX_MESSAGE_SIZE;
use bytes::Bytes;
use flate2::read::DeflateDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Compression attribute of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    /// Recognized on the wire but never encoded or decoded.
    Snappy,
}

impl Compression {
    pub fn code(&self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
        }
    }

    /// Fails for codecs this client cannot encode or decode.
    pub fn ensure_supported(&self) -> Result<(), ProtocolError> {
        match self {
            Compression::None | Compression::Gzip => Ok(()),
            Compression::Snappy => Err(ProtocolError::Unsupported("snappy compression")),
        }
    }
}

impl TryFrom<u8> for Compression {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Snappy),
            other => Err(ProtocolError::UnknownCompression(other)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Snappy => write!(f, "snappy"),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            other => Err(format!("unknown compression codec: {}", other)),
        }
    }
}

/// Gzip signature bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fixed part of the gzip header.
const GZIP_HEADER_SIZE: usize = 10;

/// CRC32 + ISIZE.
const GZIP_FOOTER_SIZE: usize = 8;

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;
/// Bits 5-7 are reserved and must be zero.
const FRESERVED: u8 = 0xE0;

/// Compression method byte of the gzip header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GzipMethod {
    Stored,
    Deflate,
}

impl TryFrom<u8> for GzipMethod {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GzipMethod::Stored),
            8 => Ok(GzipMethod::Deflate),
            1 => Err(ProtocolError::Unsupported("gzip method 1 (compress)")),
            other => Err(ProtocolError::InvalidGzipMethod(other)),
        }
    }
}

/// Compresses `data` into a gzip container.
pub fn gzip(data: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 32),
        flate2::Compression::default(),
    );
    encoder
        .write_all(data)
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;
    Ok(Bytes::from(compressed))
}

/// Parses a gzip container and returns the decompressed data.
///
/// Header fields are consumed in flag order. The decompressed data is checked
/// against both footer fields.
pub fn gunzip(container: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut reader = HeaderReader::new(container);

    let signature = reader.take(2)?;
    if signature != GZIP_MAGIC {
        return Err(ProtocolError::InvalidGzipMagic(signature[0], signature[1]));
    }

    let method_byte = reader.take(1)?[0];
    let flags = reader.take(1)?[0];
    if flags & FRESERVED != 0 {
        return Err(ProtocolError::InvalidGzipFlags(flags));
    }
    let method = GzipMethod::try_from(method_byte)?;

    // MTIME, XFL, OS
    reader.take(GZIP_HEADER_SIZE - 4)?;

    if flags & FEXTRA != 0 {
        let xlen = reader.take(2)?;
        let xlen = u16::from_le_bytes([xlen[0], xlen[1]]) as usize;
        reader.take(xlen)?;
    }
    if flags & FNAME != 0 {
        reader.take_zero_terminated("file name")?;
    }
    if flags & FCOMMENT != 0 {
        reader.take_zero_terminated("comment")?;
    }
    if flags & FHCRC != 0 {
        let actual = crc32fast::hash(reader.consumed()) & 0xFFFF;
        let stored = reader.take(2)?;
        let expected = u16::from_le_bytes([stored[0], stored[1]]) as u32;
        if actual != expected {
            return Err(ProtocolError::ChecksumMismatch {
                what: "gzip header",
                expected,
                actual,
            });
        }
    }

    let body = reader.rest();
    if body.len() < GZIP_FOOTER_SIZE {
        return Err(ProtocolError::malformed(
            "gzip container",
            format!("{} bytes left for data and footer", body.len()),
        ));
    }
    let (data, footer) = body.split_at(body.len() - GZIP_FOOTER_SIZE);
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let expected_size = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
    if expected_size as usize > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: expected_size as usize,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let decompressed = match method {
        GzipMethod::Stored => data.to_vec(),
        GzipMethod::Deflate => {
            // One byte past the declared size is enough to detect a mismatch,
            // and the declared size is already bounded.
            let mut out = Vec::new();
            DeflateDecoder::new(data)
                .take(expected_size as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|e| ProtocolError::Compression(e.to_string()))?;
            out
        }
    };

    if decompressed.len() as u64 != expected_size as u64 {
        return Err(ProtocolError::SizeMismatch {
            what: "gzip footer",
            expected: expected_size as u64,
            actual: decompressed.len() as u64,
        });
    }

    let actual_crc = crc32fast::hash(&decompressed);
    if actual_crc != expected_crc {
        return Err(ProtocolError::ChecksumMismatch {
            what: "gzip footer",
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(Bytes::from(decompressed))
}

/// Cursor over the gzip header that reports truncation as a protocol error.
struct HeaderReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() - self.pos < n {
            return Err(ProtocolError::malformed(
                "gzip header",
                format!("truncated at byte {}", self.pos),
            ));
        }
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_zero_terminated(&mut self, field: &str) -> Result<&'a [u8], ProtocolError> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            ProtocolError::malformed("gzip header", format!("unterminated {}", field))
        })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn consumed(&self) -> &'a [u8] {
        &self.buf[..self.pos]
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Builds a container by hand so that header flags can be exercised.
    fn container(flags: u8, method: u8, extra: &[u8], data: &[u8], plain: &[u8]) -> Vec<u8> {
        let mut out = vec![0x1f, 0x8b, method, flags, 0, 0, 0, 0, 0, 255];
        out.extend_from_slice(extra);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc32fast::hash(plain).to_le_bytes());
        out.extend_from_slice(&(plain.len() as u32).to_le_bytes());
        out
    }

    #[test]
    fn test_codec_codes() {
        for codec in [Compression::None, Compression::Gzip, Compression::Snappy] {
            assert_eq!(Compression::try_from(codec.code()).unwrap(), codec);
        }
        assert!(matches!(
            Compression::try_from(3),
            Err(ProtocolError::UnknownCompression(3))
        ));
    }

    #[test]
    fn test_snappy_is_unsupported() {
        let err = Compression::Snappy.ensure_supported().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(Compression::Gzip.ensure_supported().is_ok());
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("GZIP".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("lz4".parse::<Compression>().is_err());
    }

    #[test]
    fn test_gzip_roundtrip() {
        let data = b"hello hello hello hello".repeat(20);
        let compressed = gzip(&data).unwrap();
        assert_eq!(&compressed[..2], &GZIP_MAGIC);
        assert_eq!(gunzip(&compressed).unwrap(), Bytes::from(data));
    }

    #[test]
    fn test_gzip_empty() {
        let compressed = gzip(b"").unwrap();
        assert!(gunzip(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_stored_method() {
        let plain = b"stored block";
        let raw = container(0, 0, &[], plain, plain);
        assert_eq!(gunzip(&raw).unwrap().as_ref(), plain);
    }

    #[test]
    fn test_optional_header_fields() {
        let plain = b"with all the optional fields";
        let mut extra = Vec::new();
        extra.extend_from_slice(&3u16.to_le_bytes());
        extra.extend_from_slice(b"abc");
        extra.extend_from_slice(b"name.txt\0");
        extra.extend_from_slice(b"a comment\0");

        let flags = FEXTRA | FNAME | FCOMMENT | FHCRC;
        let mut header = vec![0x1f, 0x8b, 0, flags, 0, 0, 0, 0, 0, 255];
        header.extend_from_slice(&extra);
        let hcrc = (crc32fast::hash(&header) & 0xFFFF) as u16;
        extra.extend_from_slice(&hcrc.to_le_bytes());

        let raw = container(flags, 0, &extra, plain, plain);
        assert_eq!(gunzip(&raw).unwrap().as_ref(), plain);
    }

    #[test]
    fn test_header_crc_mismatch() {
        let plain = b"x";
        let raw = container(FHCRC, 0, &[0xde, 0xad], plain, plain);
        let err = gunzip(&raw).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ChecksumMismatch {
                what: "gzip header",
                ..
            }
        ));
    }

    #[test]
    fn test_bad_signature() {
        let mut raw = gzip(b"abc").unwrap().to_vec();
        raw[1] = 0x00;
        assert!(matches!(
            gunzip(&raw),
            Err(ProtocolError::InvalidGzipMagic(0x1f, 0x00))
        ));
    }

    #[test]
    fn test_reserved_flags_rejected() {
        let raw = container(0x20, 8, &[], &[], b"");
        assert!(matches!(
            gunzip(&raw),
            Err(ProtocolError::InvalidGzipFlags(0x20))
        ));
    }

    #[test]
    fn test_methods() {
        let raw = container(0, 1, &[], &[], b"");
        assert_eq!(gunzip(&raw).unwrap_err().kind(), ErrorKind::Unsupported);

        let raw = container(0, 5, &[], &[], b"");
        assert!(matches!(
            gunzip(&raw),
            Err(ProtocolError::InvalidGzipMethod(5))
        ));
    }

    #[test]
    fn test_unterminated_name() {
        let mut raw = vec![0x1f, 0x8b, 8, FNAME, 0, 0, 0, 0, 0, 255];
        raw.extend_from_slice(b"no terminator");
        assert!(matches!(
            gunzip(&raw),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            gunzip(&[0x1f, 0x8b, 8]),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_footer_size_mismatch() {
        let plain = b"abcdef";
        let mut raw = container(0, 0, &[], plain, plain);
        let len = raw.len();
        raw[len - 4..].copy_from_slice(&99u32.to_le_bytes());
        let err = gunzip(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::SizeMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Checksum);
    }

    #[test]
    fn test_footer_crc_mismatch() {
        let plain = b"abcdef";
        let mut raw = container(0, 0, &[], plain, plain);
        let len = raw.len();
        raw[len - 8] ^= 0x01;
        assert!(matches!(
            gunzip(&raw),
            Err(ProtocolError::ChecksumMismatch {
                what: "gzip footer",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_footer_rejected_before_inflating() {
        let plain = b"tiny";
        let mut raw = container(0, 0, &[], plain, plain);
        let len = raw.len();
        raw[len - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = gunzip(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_decompression_bomb_rejected() {
        let container = gzip(&vec![0u8; MAX_MESSAGE_SIZE + 1]).unwrap();
        assert!(container.len() < 64 * 1024);
        assert!(matches!(
            gunzip(&container),
            Err(ProtocolError::MessageTooLarge { size, max })
                if size == MAX_MESSAGE_SIZE + 1 && max == MAX_MESSAGE_SIZE
        ));
    }
}
