//! Message set iteration.

use crate::channel::{Channel, ReadMessage};
use crate::error::ClientError;
use franz_protocol::{ErrorKind, Message, Offset};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Lazy, finite, non-restartable sequence of messages in one response.
///
/// The watermark offset it borrows moves forward by a message's wire size
/// before that message is handed out, and never moves on failure. A caller
/// that persists the offset right after each message therefore never sees a
/// message twice after a restart.
pub struct MessageSet<'a, S> {
    channel: &'a mut Channel<S>,
    offset: &'a mut Offset,
    start: Offset,
    consumed: usize,
    partial: Option<u32>,
    done: bool,
}

impl<'a, S> MessageSet<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Iterates the response whose header the channel has just read.
    pub fn new(channel: &'a mut Channel<S>, offset: &'a mut Offset) -> Self {
        let start = *offset;
        Self {
            channel,
            offset,
            start,
            consumed: 0,
            partial: None,
            done: false,
        }
    }

    /// Returns the next message, or `None` once the response is exhausted.
    ///
    /// Any error ends the iteration. The offset still points at the start of
    /// the message that failed.
    pub async fn next(&mut self) -> Result<Option<Message>, ClientError> {
        if self.done {
            return Ok(None);
        }

        match self.channel.read_message(*self.offset).await {
            Ok(ReadMessage::Message(message)) => {
                let next = match self.offset.advance(message.wire_size() as u64) {
                    Ok(next) => next,
                    Err(e) => {
                        self.done = true;
                        return Err(e.into());
                    }
                };
                *self.offset = next;
                self.consumed += 1;
                trace!(offset = %message.offset(), next = %next, "message consumed");
                Ok(Some(message))
            }
            Ok(ReadMessage::Partial { size, available }) => {
                debug!(
                    offset = %self.offset,
                    size,
                    available,
                    "message set ends with a partial message"
                );
                self.partial = Some(size);
                self.done = true;
                Ok(None)
            }
            Ok(ReadMessage::Exhausted) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                if e.kind() != ErrorKind::Transport && self.channel.has_more_data() {
                    if let Err(drain) = self.channel.skip_remaining().await {
                        debug!(error = %drain, "could not drain response after decode error");
                    }
                }
                Err(e)
            }
        }
    }

    /// Reads every remaining message.
    pub async fn collect(mut self) -> Result<Vec<Message>, ClientError> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Current watermark.
    pub fn offset(&self) -> Offset {
        *self.offset
    }

    /// Number of messages handed out so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes of the log covered by the messages handed out so far.
    pub fn valid_bytes(&self) -> u64 {
        self.offset.value() - self.start.value()
    }

    /// Declared size of a trailing message the response cut short, if any.
    pub fn partial_tail(&self) -> Option<u32> {
        self.partial
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
