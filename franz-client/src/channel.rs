//! Streaming channel over a broker connection.
//!
//! The channel never buffers a whole response. After a response header is
//! read it tracks how many body bytes the broker announced and hands them
//! out one message at a time.

use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use franz_protocol::{
    Message, Offset, ProtocolError, Request, ResponseHeader, LENGTH_PREFIX_SIZE,
    MAX_MESSAGE_SIZE, RESPONSE_HEADER_SIZE,
};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Result of reading the next message of a response.
#[derive(Debug)]
pub enum ReadMessage {
    /// A complete, validated message.
    Message(Message),
    /// The response ends with a message cut short by the fetch size. Its
    /// bytes have been discarded.
    Partial { size: u32, available: u64 },
    /// Every byte of the response has been consumed.
    Exhausted,
}

/// A byte channel to one broker, used by one task at a time.
pub struct Channel<S> {
    stream: S,
    io_timeout: Option<Duration>,
    /// Body bytes of the current response not yet read.
    remaining: u64,
    closed: bool,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            io_timeout: None,
            remaining: 0,
            closed: false,
        }
    }

    /// Bounds every socket read and write. `None` waits forever.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Returns whether a previous I/O failure closed this channel.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns whether the current response still has unread bytes.
    pub fn has_more_data(&self) -> bool {
        !self.closed && self.remaining > 0
    }

    /// Unread body bytes of the current response.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Writes `bytes` and returns how many the transport accepted.
    ///
    /// There is no acknowledgement in this protocol version; a successful
    /// return only means the bytes were handed to the socket.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, ClientError> {
        self.ensure_open()?;
        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        let result = with_timeout(timeout, async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await;
        self.track(result)?;
        Ok(bytes.len())
    }

    /// Encodes and writes a request.
    ///
    /// Any unread part of the previous response is drained first so the
    /// next response header lines up.
    pub async fn send(&mut self, request: &impl Request) -> Result<usize, ClientError> {
        if self.remaining > 0 {
            warn!(
                bytes = self.remaining,
                "discarding unread response data before next request"
            );
            self.skip_remaining().await?;
        }
        let frame = request.encode()?;
        debug!(
            request = ?request.request_type(),
            bytes = frame.len(),
            "sending request"
        );
        self.write(&frame).await
    }

    /// Reads a response header and announces its body.
    ///
    /// A broker error drains the body and is returned as
    /// [`ClientError::Broker`].
    pub async fn begin_response(&mut self) -> Result<ResponseHeader, ClientError> {
        self.ensure_open()?;
        if self.remaining > 0 {
            self.skip_remaining().await?;
        }

        let mut raw = [0u8; RESPONSE_HEADER_SIZE];
        let timeout = self.io_timeout;
        let result = with_timeout(timeout, self.stream.read_exact(&mut raw)).await;
        self.track(result)?;

        // The frame boundary is lost once a header fails to parse.
        let header = self.track(ResponseHeader::decode(&raw).map_err(ClientError::from))?;
        self.remaining = header.body_len as u64;
        debug!(body_len = header.body_len, error = %header.error, "response header");

        if !header.error.is_ok() {
            warn!(error = %header.error, "broker returned an error");
            self.skip_remaining().await?;
            return Err(ClientError::Broker(header.error));
        }
        Ok(header)
    }

    /// Reads exactly `n` bytes of the current response.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, ClientError> {
        self.ensure_open()?;
        if n as u64 > self.remaining {
            return Err(ProtocolError::Malformed {
                what: "response",
                reason: format!(
                    "read of {} bytes past the response boundary ({} left)",
                    n, self.remaining
                ),
            }
            .into());
        }

        let mut buf = BytesMut::zeroed(n);
        let timeout = self.io_timeout;
        let result = with_timeout(timeout, self.stream.read_exact(&mut buf)).await;
        self.track(result)?;
        self.remaining -= n as u64;
        Ok(buf.freeze())
    }

    /// Discards the rest of the current response.
    pub async fn skip_remaining(&mut self) -> Result<u64, ClientError> {
        self.ensure_open()?;
        let expected = self.remaining;
        if expected == 0 {
            return Ok(0);
        }

        let timeout = self.io_timeout;
        let mut limited = (&mut self.stream).take(expected);
        let mut sink = tokio::io::sink();
        let result = with_timeout(timeout, tokio::io::copy(&mut limited, &mut sink)).await;
        let skipped = self.track(result)?;
        if skipped < expected {
            self.closed = true;
            return Err(ClientError::ConnectionClosed);
        }
        self.remaining = 0;
        trace!(bytes = skipped, "skipped response data");
        Ok(skipped)
    }

    /// Reads and decodes the next message of the current response.
    ///
    /// The message is read in full before it is decoded; a decode error
    /// leaves the channel at the next message boundary.
    pub async fn read_message(&mut self, offset: Offset) -> Result<ReadMessage, ClientError> {
        if self.remaining == 0 {
            return Ok(ReadMessage::Exhausted);
        }
        if self.remaining < LENGTH_PREFIX_SIZE as u64 {
            let available = self.remaining;
            self.skip_remaining().await?;
            return Ok(ReadMessage::Partial {
                size: 0,
                available,
            });
        }

        let prefix = self.read_exact(LENGTH_PREFIX_SIZE).await?;
        let size = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if size as u64 > self.remaining {
            let available = self.remaining;
            debug!(size, available, "response ends with a partial message");
            self.skip_remaining().await?;
            return Ok(ReadMessage::Partial { size, available });
        }
        if size as usize > MAX_MESSAGE_SIZE {
            self.skip_remaining().await?;
            return Err(ProtocolError::MessageTooLarge {
                size: size as usize,
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }

        let body = self.read_exact(size as usize).await?;
        let message = Message::decode_body(body, offset)?;
        trace!(%offset, size, compression = %message.compression(), "read message");
        Ok(ReadMessage::Message(message))
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    /// Marks the channel closed when an I/O operation failed.
    fn track<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if result.is_err() {
            self.closed = true;
        }
        result
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, ClientError> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => fut.await,
    };
    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
        _ => ClientError::Io(e),
    })
}
