//! Broker intake definitions
//!
//! The two kinds of input the broker consumes (lifecycle events and chat
//! messages) and `Intake`, the send-only handle producers use to reach it.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::types::ConnectionId;

/// Connection lifecycle notification
#[derive(Debug)]
pub enum LifecycleEvent {
    /// Accepted by the listener, not yet registered
    Connected(Connection),
    /// Teardown ran for this connection
    Disconnected(ConnectionId),
}

/// Bytes read from one connection, to be relayed to all others
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Originating connection (excluded from fan-out)
    pub from: ConnectionId,
    /// Exactly the bytes returned by one read
    pub payload: Bytes,
}

/// Send-only capability for the broker's intake
///
/// Held by the listener and by every connection. Events go over an
/// unbounded channel so they can be reported from any context without
/// awaiting; chat messages go over a bounded one.
#[derive(Debug, Clone)]
pub struct Intake {
    events: mpsc::UnboundedSender<LifecycleEvent>,
    messages: mpsc::Sender<ChatMessage>,
}

impl Intake {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<LifecycleEvent>,
        messages: mpsc::Sender<ChatMessage>,
    ) -> Self {
        Self { events, messages }
    }

    /// Report a lifecycle event
    ///
    /// Returns false if the broker has stopped.
    pub fn report(&self, event: LifecycleEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Forward a chat message, waiting for room in the intake
    ///
    /// Returns false if the broker has stopped.
    pub async fn relay(&self, message: ChatMessage) -> bool {
        self.messages.send(message).await.is_ok()
    }
}
