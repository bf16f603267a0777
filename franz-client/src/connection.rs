//! TCP connection setup.

use crate::channel::Channel;
use crate::error::ClientError;
use franz_protocol::DEFAULT_PORT;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker address, `host:port`.
    pub addr: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-operation read/write timeout. `None` waits forever.
    pub io_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(format!("127.0.0.1:{}", DEFAULT_PORT))
    }
}

/// Opens a channel to a broker.
pub async fn connect(config: &ConnectionConfig) -> Result<Channel<TcpStream>, ClientError> {
    tracing::debug!("Connecting to {}...", config.addr);

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

    stream.set_nodelay(true).ok();
    tracing::debug!("Connected to {}", config.addr);

    Ok(Channel::new(stream).with_io_timeout(config.io_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use franz_protocol::ErrorKind;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::new("broker:9092")
            .with_connect_timeout(Duration::from_millis(250))
            .with_io_timeout(None);
        assert_eq!(config.addr, "broker:9092");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(config.io_timeout.is_none());
        assert_eq!(ConnectionConfig::default().addr, "127.0.0.1:9092");
    }

    #[tokio::test]
    async fn test_connect_and_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut channel = connect(&ConnectionConfig::new(addr.to_string()))
            .await
            .unwrap();
        assert_eq!(channel.write(b"ping").await.unwrap(), 4);
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&ConnectionConfig::new(addr.to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
