//! Producer-side batching.
//!
//! Entries are buffered with the codec chosen for each add. When the batch
//! is turned into wire messages, every run of consecutive entries sharing a
//! compressed codec becomes one wrapper message; uncompressed entries stay
//! individual messages. Order is never changed.

use bytes::Bytes;
use franz_protocol::{Compression, Message, ProtocolError};

/// Buffered payloads for one topic partition.
#[derive(Debug, Clone, Default)]
pub struct ProduceBatch {
    entries: Vec<(Compression, Bytes)>,
}

impl ProduceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a payload. Snappy is refused here rather than at send time.
    pub fn push(&mut self, payload: impl Into<Bytes>, codec: Compression) -> Result<(), ProtocolError> {
        codec.ensure_supported()?;
        self.entries.push((codec, payload.into()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sum of the buffered payload sizes.
    pub fn payload_bytes(&self) -> usize {
        self.entries.iter().map(|(_, p)| p.len()).sum()
    }

    /// Builds the wire messages for the buffered entries.
    pub fn to_messages(&self) -> Result<Vec<Message>, ProtocolError> {
        let mut messages = Vec::new();
        let mut start = 0;
        while start < self.entries.len() {
            let codec = self.entries[start].0;
            let end = self.entries[start..]
                .iter()
                .position(|(c, _)| *c != codec)
                .map_or(self.entries.len(), |n| start + n);
            let run = &self.entries[start..end];

            match codec {
                Compression::None => {
                    for (_, payload) in run {
                        messages.push(Message::encode(payload.clone(), Compression::None)?);
                    }
                }
                Compression::Gzip | Compression::Snappy => {
                    let inner = run.iter().map(|(_, p)| Message::new(p.clone())).collect();
                    messages.push(Message::wrap(inner, codec)?);
                }
            }
            start = end;
        }
        Ok(messages)
    }
}
