//! Buffered producer.

use crate::batch::ProduceBatch;
use crate::channel::Channel;
use crate::error::ClientError;
use bytes::Bytes;
use franz_protocol::{Compression, MultiProduceRequest, ProduceRequest, TopicPartition};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Buffers payloads per topic partition and writes them in one request.
///
/// The broker does not acknowledge produce requests in this protocol
/// version. A successful [`send`](Producer::send) only means the transport
/// accepted every byte.
pub struct Producer<S> {
    channel: Channel<S>,
    pending: Vec<(TopicPartition, ProduceBatch)>,
}

impl<S> Producer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: Channel<S>) -> Self {
        Self {
            channel,
            pending: Vec::new(),
        }
    }

    /// Buffers one payload for `topic`/`partition`.
    pub fn add(
        &mut self,
        topic: &str,
        partition: u32,
        payload: impl Into<Bytes>,
        codec: Compression,
    ) -> Result<(), ClientError> {
        codec.ensure_supported()?;
        let batch = match self
            .pending
            .iter()
            .position(|(t, _)| t.topic == topic && t.partition == partition)
        {
            Some(i) => &mut self.pending[i].1,
            None => {
                self.pending
                    .push((TopicPartition::new(topic, partition), ProduceBatch::new()));
                let last = self.pending.len() - 1;
                &mut self.pending[last].1
            }
        };
        batch.push(payload, codec)?;
        Ok(())
    }

    /// Number of buffered payloads across all targets.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|(_, b)| b.len()).sum()
    }

    /// Writes everything buffered and returns the bytes written.
    ///
    /// The buffer is kept if encoding or the write fails.
    pub async fn send(&mut self) -> Result<usize, ClientError> {
        let mut requests = Vec::with_capacity(self.pending.len());
        for (target, batch) in &self.pending {
            if batch.is_empty() {
                continue;
            }
            requests.push(ProduceRequest {
                target: target.clone(),
                messages: batch.to_messages()?,
            });
        }

        let written = match requests.len() {
            0 => return Ok(0),
            1 => {
                let request = requests.remove(0);
                debug!(
                    target = %request.target,
                    messages = request.messages.len(),
                    bytes = request.message_set_size(),
                    "produce"
                );
                self.channel.send(&request).await?
            }
            n => {
                debug!(targets = n, "multi-produce");
                self.channel.send(&MultiProduceRequest { requests }).await?
            }
        };
        self.pending.clear();
        Ok(written)
    }

    pub fn into_channel(self) -> Channel<S> {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use franz_protocol::{ErrorKind, Request};
    use std::time::Duration;

    fn expected_produce(topic: &str, payloads: &[&str], codec: Compression) -> ProduceRequest {
        let mut batch = ProduceBatch::new();
        for p in payloads {
            batch.push(p.to_string(), codec).unwrap();
        }
        ProduceRequest {
            target: TopicPartition::new(topic, 0),
            messages: batch.to_messages().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_send_single_target() {
        let expected = expected_produce("t", &["a", "b", "c"], Compression::Gzip);
        assert_eq!(expected.messages.len(), 1);
        let frame = expected.encode().unwrap();

        let mock = tokio_test::io::Builder::new().write(&frame).build();
        let mut producer = Producer::new(Channel::new(mock));
        for p in ["a", "b", "c"] {
            producer.add("t", 0, p.to_string(), Compression::Gzip).unwrap();
        }
        assert_eq!(producer.pending_count(), 3);
        assert_eq!(producer.send().await.unwrap(), frame.len());
        assert_eq!(producer.pending_count(), 0);
        assert_eq!(producer.send().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_several_targets() {
        let frame = MultiProduceRequest {
            requests: vec![
                expected_produce("x", &["1", "3"], Compression::None),
                expected_produce("y", &["2"], Compression::None),
            ],
        }
        .encode()
        .unwrap();

        let mock = tokio_test::io::Builder::new().write(&frame).build();
        let mut producer = Producer::new(Channel::new(mock));
        producer.add("x", 0, "1", Compression::None).unwrap();
        producer.add("y", 0, "2", Compression::None).unwrap();
        producer.add("x", 0, "3", Compression::None).unwrap();
        assert_eq!(producer.send().await.unwrap(), frame.len());
    }

    #[tokio::test]
    async fn test_snappy_rejected() {
        let mock = tokio_test::io::Builder::new().build();
        let mut producer = Producer::new(Channel::new(mock));
        let err = producer
            .add("t", 0, "x", Compression::Snappy)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(producer.pending_count(), 0);
        assert!(producer.pending.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_buffer() {
        let (client, server) = tokio::io::duplex(8);
        let channel = Channel::new(client).with_io_timeout(Some(Duration::from_millis(20)));
        let mut producer = Producer::new(channel);
        producer
            .add("t", 0, vec![0u8; 256], Compression::None)
            .unwrap();

        let err = producer.send().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(producer.pending_count(), 1);
        drop(server);
    }
}
