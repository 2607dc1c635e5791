//! Multi-client TCP Chat Relay Library
//!
//! Clients connect over raw TCP and every chunk of bytes one client sends is
//! relayed to all other connected clients. There is no framing: a message is
//! whatever a single read returned.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Broker` is the central actor owning the membership table
//! - `Listener` accepts sockets and reports them as `Connected` events
//! - Each connection runs an inbound and an outbound task that talk to the
//!   broker only through its `Intake`
//! - A client whose outbound queue fills up is disconnected instead of
//!   stalling fan-out for everyone else
//!
//! # Example
//! ```ignore
//! use chat_relay::{Broker, Listener, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RelayConfig::default();
//!     let (broker, intake) = Broker::new(config.message_capacity);
//!     let listener = Listener::bind(&config, intake).await.unwrap();
//!
//!     tokio::spawn(broker.run());
//!     listener.run().await;
//! }
//! ```

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod types;

// Re-export main types for convenience
pub use broker::Broker;
pub use config::RelayConfig;
pub use connection::{ByteStream, Connection, ConnectionHandle};
pub use error::{EnqueueError, RelayError};
pub use listener::Listener;
pub use message::{ChatMessage, Intake, LifecycleEvent};
pub use types::{ConnectionId, IdAllocator};
