//! # franz-client
//!
//! Async client for the 0.7 log broker protocol.
//!
//! # Example
//!
//! ```ignore
//! use franz_client::{connect, ClientConfig, Consumer};
//! use franz_protocol::{Offset, TopicPartition};
//!
//! let config = ClientConfig::load()?;
//! let channel = connect(&config.connection_config()).await?;
//! let mut consumer = Consumer::new(
//!     channel,
//!     TopicPartition::new("events", 0),
//!     Offset::ZERO,
//!     config.fetch_max_size,
//! );
//!
//! let mut set = consumer.fetch().await?;
//! while let Some(message) = set.next().await? {
//!     println!("{:?}", message.payload());
//!     // set.offset() is safe to persist here.
//! }
//! ```

pub mod batch;
pub mod channel;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod message_set;
pub mod producer;

pub use batch::ProduceBatch;
pub use channel::{Channel, ReadMessage};
pub use config::{ClientConfig, ConfigError};
pub use connection::{connect, ConnectionConfig};
pub use consumer::Consumer;
pub use error::ClientError;
pub use message_set::MessageSet;
pub use producer::Producer;
