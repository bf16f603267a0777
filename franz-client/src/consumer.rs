//! Fetching consumer for one topic partition.

use crate::channel::Channel;
use crate::error::ClientError;
use crate::message_set::MessageSet;
use franz_protocol::offset::OFFSET_WIRE_SIZE;
use franz_protocol::response::decode_offsets;
use franz_protocol::{
    FetchRequest, Message, Offset, OffsetTime, OffsetsRequest, ProtocolError, TopicPartition,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Reads a partition from a watermark offset.
///
/// The watermark only moves when a message is handed out, so it can be
/// persisted at any time and used to resume after a failure.
pub struct Consumer<S> {
    channel: Channel<S>,
    target: TopicPartition,
    offset: Offset,
    max_size: u32,
}

impl<S> Consumer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: Channel<S>, target: TopicPartition, offset: Offset, max_size: u32) -> Self {
        Self {
            channel,
            target,
            offset,
            max_size,
        }
    }

    /// Current watermark.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Moves the watermark, e.g. after an offsets lookup.
    pub fn seek(&mut self, offset: Offset) {
        self.offset = offset;
    }

    pub fn target(&self) -> &TopicPartition {
        &self.target
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn into_channel(self) -> Channel<S> {
        self.channel
    }

    /// Issues a fetch from the watermark and returns the response's messages.
    pub async fn fetch(&mut self) -> Result<MessageSet<'_, S>, ClientError> {
        let request = FetchRequest {
            target: self.target.clone(),
            offset: self.offset,
            max_size: self.max_size,
        };
        self.channel.send(&request).await?;
        let header = self.channel.begin_response().await?;
        debug!(
            target = %self.target,
            offset = %self.offset,
            bytes = header.body_len,
            "fetch response"
        );
        Ok(MessageSet::new(&mut self.channel, &mut self.offset))
    }

    /// Fetches once and collects every complete message.
    ///
    /// An empty result means the partition has nothing past the watermark.
    /// A response holding only a partial message means the next message is
    /// bigger than `max_size` and is reported as
    /// [`ClientError::MessageTooLarge`].
    pub async fn poll(&mut self) -> Result<Vec<Message>, ClientError> {
        let max_size = self.max_size;
        let mut set = self.fetch().await?;
        let mut messages = Vec::new();
        while let Some(message) = set.next().await? {
            messages.push(message);
        }
        if messages.is_empty() && set.partial_tail().is_some() {
            return Err(ClientError::MessageTooLarge {
                offset: set.offset(),
                max_size,
            });
        }
        Ok(messages)
    }

    /// Asks the broker for up to `max` segment start offsets before `time`.
    pub async fn offsets_before(
        &mut self,
        time: OffsetTime,
        max: u32,
    ) -> Result<Vec<Offset>, ClientError> {
        let request = OffsetsRequest {
            target: self.target.clone(),
            time,
            max_offsets: max,
        };
        self.channel.send(&request).await?;
        let header = self.channel.begin_response().await?;
        let limit = 4 + max as u64 * OFFSET_WIRE_SIZE as u64;
        if header.body_len as u64 > limit {
            self.channel.skip_remaining().await?;
            return Err(ProtocolError::Malformed {
                what: "offsets response",
                reason: format!("{} bytes for at most {} offsets", header.body_len, max),
            }
            .into());
        }
        let mut body = self.channel.read_exact(header.body_len as usize).await?;
        let offsets = decode_offsets(&mut body)?;
        info!(target = %self.target, ?time, count = offsets.len(), "offsets");
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};
    use franz_protocol::{Compression, ErrorKind, Request};

    fn response(error: i16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((body.len() + 2) as u32).to_be_bytes());
        out.extend_from_slice(&error.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn fetch_frame(offset: Offset, max_size: u32) -> BytesMut {
        FetchRequest {
            target: TopicPartition::new("events", 0),
            offset,
            max_size,
        }
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_poll_advances_watermark() {
        let a = Message::new(Bytes::from_static(b"a"));
        let b = Message::encode(Bytes::from_static(b"b"), Compression::Gzip).unwrap();
        let mut body = BytesMut::new();
        a.write_to(&mut body);
        b.write_to(&mut body);
        let next = Offset::new(500 + body.len() as u64);

        let mock = tokio_test::io::Builder::new()
            .write(&fetch_frame(Offset::new(500), 4096))
            .read(&response(0, &body))
            .write(&fetch_frame(next, 4096))
            .read(&response(0, b""))
            .build();
        let mut consumer = Consumer::new(
            Channel::new(mock),
            TopicPartition::new("events", 0),
            Offset::new(500),
            4096,
        );

        let messages = consumer.poll().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].payload().as_ref(), b"b");
        assert_eq!(consumer.offset(), next);

        assert!(consumer.poll().await.unwrap().is_empty());
        assert_eq!(consumer.offset(), next);
    }

    #[tokio::test]
    async fn test_poll_reports_message_too_large() {
        let big = Message::new(Bytes::from(vec![7u8; 64])).to_bytes();
        let mock = tokio_test::io::Builder::new()
            .write(&fetch_frame(Offset::ZERO, 16))
            .read(&response(0, &big[..16]))
            .build();
        let mut consumer = Consumer::new(
            Channel::new(mock),
            TopicPartition::new("events", 0),
            Offset::ZERO,
            16,
        );

        let err = consumer.poll().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::MessageTooLarge { max_size: 16, .. }
        ));
        assert_eq!(consumer.offset(), Offset::ZERO);
    }

    #[tokio::test]
    async fn test_broker_error_keeps_watermark() {
        let mock = tokio_test::io::Builder::new()
            .write(&fetch_frame(Offset::new(9), 100))
            .read(&response(1, b""))
            .build();
        let mut consumer = Consumer::new(
            Channel::new(mock),
            TopicPartition::new("events", 0),
            Offset::new(9),
            100,
        );
        let err = consumer.poll().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Broker);
        assert_eq!(consumer.offset(), Offset::new(9));
    }

    #[tokio::test]
    async fn test_offsets_before() {
        let request = OffsetsRequest {
            target: TopicPartition::new("events", 0),
            time: OffsetTime::Earliest,
            max_offsets: 1,
        };
        let mut body = BytesMut::new();
        body.put_u32(1);
        body.put_u64(1 << 33);

        let mock = tokio_test::io::Builder::new()
            .write(&request.encode().unwrap())
            .read(&response(0, &body))
            .build();
        let mut consumer = Consumer::new(
            Channel::new(mock),
            TopicPartition::new("events", 0),
            Offset::ZERO,
            100,
        );
        let offsets = consumer
            .offsets_before(OffsetTime::Earliest, 1)
            .await
            .unwrap();
        assert_eq!(offsets, vec![Offset::new(1 << 33)]);

        consumer.seek(offsets[0]);
        assert_eq!(consumer.offset().value(), 1 << 33);
    }

    #[tokio::test]
    async fn test_offsets_body_larger_than_requested() {
        let request = OffsetsRequest {
            target: TopicPartition::new("events", 0),
            time: OffsetTime::Latest,
            max_offsets: 1,
        };
        let mut body = BytesMut::new();
        body.put_u32(5);
        for i in 0..5u64 {
            body.put_u64(i);
        }

        let mock = tokio_test::io::Builder::new()
            .write(&request.encode().unwrap())
            .read(&response(0, &body))
            .build();
        let mut consumer = Consumer::new(
            Channel::new(mock),
            TopicPartition::new("events", 0),
            Offset::ZERO,
            100,
        );
        let err = consumer
            .offsets_before(OffsetTime::Latest, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        // The oversized body was drained, not buffered.
        let channel = consumer.into_channel();
        assert!(!channel.has_more_data());
        assert!(!channel.is_closed());
    }
}
