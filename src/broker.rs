//! Broker actor implementation
//!
//! The single decision point of the relay. Owns the membership table and
//! processes one lifecycle event or chat message at a time, so the table is
//! never touched outside this task and needs no lock.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionHandle};
use crate::error::EnqueueError;
use crate::message::{ChatMessage, Intake, LifecycleEvent};
use crate::types::ConnectionId;

/// The broker actor
///
/// A connection is a member from the moment its `Connected` event is
/// handled until its `Disconnected` event is handled.
pub struct Broker {
    /// Registered connections: ConnectionId -> ConnectionHandle
    members: HashMap<ConnectionId, ConnectionHandle>,
    /// Lifecycle event intake
    events: mpsc::UnboundedReceiver<LifecycleEvent>,
    /// Chat message intake
    messages: mpsc::Receiver<ChatMessage>,
}

impl Broker {
    /// Create a broker and the intake handle that feeds it
    ///
    /// `message_capacity` bounds the chat message intake and must be non-zero.
    pub fn new(message_capacity: usize) -> (Self, Intake) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (messages_tx, messages) = mpsc::channel(message_capacity);

        let broker = Self {
            members: HashMap::new(),
            events,
            messages,
        };
        (broker, Intake::new(events_tx, messages_tx))
    }

    /// Number of registered connections
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Run the broker event loop
    ///
    /// Waits on both intakes with no priority between them. Returns once
    /// every `Intake` clone has been dropped.
    pub async fn run(mut self) {
        info!("Broker started");

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(message) = self.messages.recv() => self.handle_message(message),
                else => break,
            }
        }

        info!("Broker shutting down");
    }

    /// Process a single lifecycle event
    fn handle_event(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Connected(connection) => self.handle_connect(connection),
            LifecycleEvent::Disconnected(id) => self.handle_disconnect(id),
        }
    }

    /// Register a connection, then start its loops
    fn handle_connect(&mut self, connection: Connection) {
        let id = connection.id();
        self.members.insert(id, connection.handle());
        connection.spawn();

        info!("Connection {} registered", id);
        debug!("Total members: {}", self.members.len());
    }

    /// Drop a connection from membership; absent ids are ignored
    fn handle_disconnect(&mut self, id: ConnectionId) {
        if self.members.remove(&id).is_some() {
            info!("Connection {} disconnected", id);
            debug!("Total members: {}", self.members.len());
        }
    }

    /// Fan a message out to every member except its sender
    ///
    /// Never waits on a member's queue. A member whose queue is full is torn
    /// down; it leaves membership when its `Disconnected` event arrives.
    fn handle_message(&mut self, message: ChatMessage) {
        let ChatMessage { from, payload } = message;

        for (id, member) in &self.members {
            if *id == from {
                continue;
            }

            match member.try_enqueue(payload.clone()) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    warn!("Outbound queue for connection {} overflowed, disconnecting", id);
                    member.close();
                }
                Err(EnqueueError::Closed) => {
                    debug!("Connection {} already closing, skipped", id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::{sleep, timeout};

    const OUTBOUND_CAPACITY: usize = 8;

    /// Register a connection over an in-memory pipe and return the client end
    fn connect(broker: &mut Broker, intake: &Intake, id: u64) -> DuplexStream {
        let (server_end, client_end) = duplex(1024);
        let connection = Connection::new(
            ConnectionId(id),
            server_end,
            intake.clone(),
            OUTBOUND_CAPACITY,
        );
        broker.handle_event(LifecycleEvent::Connected(connection));
        client_end
    }

    fn chat(from: u64, payload: &'static [u8]) -> ChatMessage {
        ChatMessage {
            from: ConnectionId(from),
            payload: Bytes::from_static(payload),
        }
    }

    async fn read_n(client: &mut DuplexStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        timeout(Duration::from_secs(1), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for data")
            .unwrap();
        buf
    }

    async fn assert_silent(client: &mut DuplexStream) {
        let mut buf = [0u8; 16];
        let res = timeout(Duration::from_millis(100), client.read(&mut buf)).await;
        assert!(res.is_err(), "expected no data, got {:?}", res);
    }

    #[tokio::test]
    async fn test_connect_registers_member() {
        let (mut broker, intake) = Broker::new(16);
        let _c1 = connect(&mut broker, &intake, 1);
        let _c2 = connect(&mut broker, &intake, 2);

        assert_eq!(broker.member_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (mut broker, intake) = Broker::new(16);
        let _c1 = connect(&mut broker, &intake, 1);

        broker.handle_event(LifecycleEvent::Disconnected(ConnectionId(1)));
        assert_eq!(broker.member_count(), 0);

        broker.handle_event(LifecycleEvent::Disconnected(ConnectionId(1)));
        broker.handle_event(LifecycleEvent::Disconnected(ConnectionId(99)));
        assert_eq!(broker.member_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let (mut broker, intake) = Broker::new(16);
        let mut c1 = connect(&mut broker, &intake, 1);
        let mut c2 = connect(&mut broker, &intake, 2);
        let mut c3 = connect(&mut broker, &intake, 3);

        broker.handle_message(chat(2, b"hello"));

        assert_eq!(read_n(&mut c1, 5).await, b"hello");
        assert_eq!(read_n(&mut c3, 5).await, b"hello");
        assert_silent(&mut c2).await;
    }

    #[tokio::test]
    async fn test_broadcast_delivered_exactly_once() {
        let (mut broker, intake) = Broker::new(16);
        let mut c1 = connect(&mut broker, &intake, 1);
        let _c2 = connect(&mut broker, &intake, 2);

        broker.handle_message(chat(2, b"ping"));

        assert_eq!(read_n(&mut c1, 4).await, b"ping");
        assert_silent(&mut c1).await;
    }

    #[tokio::test]
    async fn test_removed_member_gets_no_broadcast() {
        let (mut broker, intake) = Broker::new(16);
        let c1 = connect(&mut broker, &intake, 1);
        let mut c2 = connect(&mut broker, &intake, 2);
        let mut c3 = connect(&mut broker, &intake, 3);

        // Peer closes; the inbound loop reports Disconnected
        drop(c1);
        let event = timeout(Duration::from_secs(1), broker.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, LifecycleEvent::Disconnected(ConnectionId(1))));
        broker.handle_event(event);

        assert_eq!(broker.member_count(), 2);
        assert!(!broker.members.contains_key(&ConnectionId(1)));

        broker.handle_message(chat(3, b"world"));
        assert_eq!(read_n(&mut c2, 5).await, b"world");
        assert_silent(&mut c3).await;
    }

    #[tokio::test]
    async fn test_overflow_disconnects_slow_member() {
        let (mut broker, intake) = Broker::new(16);
        let mut healthy = connect(&mut broker, &intake, 1);

        // Never spawned, so nothing drains its queue
        let (server_end, _client_end) = duplex(1024);
        let stalled = Connection::new(ConnectionId(2), server_end, intake.clone(), 1);
        let stalled_handle = stalled.handle();
        broker.members.insert(ConnectionId(2), stalled_handle.clone());

        broker.handle_message(chat(3, b"a"));
        broker.handle_message(chat(3, b"b"));
        broker.handle_message(chat(3, b"c"));

        assert_eq!(read_n(&mut healthy, 3).await, b"abc");
        assert!(!stalled_handle.is_open());

        let event = broker.events.try_recv().unwrap();
        assert!(matches!(event, LifecycleEvent::Disconnected(ConnectionId(2))));
        broker.handle_event(event);
        assert_eq!(broker.member_count(), 1);

        // Exactly one teardown despite repeated overflow
        assert!(broker.events.try_recv().is_err());
        drop(stalled);
    }

    #[tokio::test]
    async fn test_stalled_writer_does_not_block_others() {
        let (mut broker, intake) = Broker::new(16);
        let mut healthy = connect(&mut broker, &intake, 1);

        // Tiny pipe that the client never reads: the outbound loop stalls
        // in write and the queue fills behind it
        let (server_end, _stalled_client) = duplex(1);
        let stalled = Connection::new(ConnectionId(2), server_end, intake.clone(), 1);
        let stalled_handle = stalled.handle();
        broker.handle_event(LifecycleEvent::Connected(stalled));

        for _ in 0..10 {
            broker.handle_message(chat(3, b"x"));
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(read_n(&mut healthy, 10).await, b"xxxxxxxxxx");
        assert!(!stalled_handle.is_open());
    }

    #[tokio::test]
    async fn test_run_relays_between_clients() {
        let (broker, intake) = Broker::new(16);
        let server = tokio::spawn(broker.run());

        let mut clients = Vec::new();
        for id in 1..=3 {
            let (server_end, client_end) = duplex(1024);
            let connection =
                Connection::new(ConnectionId(id), server_end, intake.clone(), OUTBOUND_CAPACITY);
            assert!(intake.report(LifecycleEvent::Connected(connection)));
            clients.push(client_end);
        }
        sleep(Duration::from_millis(50)).await;

        clients[0].write_all(b"hi there").await.unwrap();

        assert_eq!(read_n(&mut clients[1], 8).await, b"hi there");
        assert_eq!(read_n(&mut clients[2], 8).await, b"hi there");
        assert_silent(&mut clients[0]).await;

        server.abort();
    }

    #[tokio::test]
    async fn test_run_ends_when_intake_dropped() {
        let (broker, intake) = Broker::new(16);
        drop(intake);

        timeout(Duration::from_secs(1), broker.run())
            .await
            .expect("broker did not stop");
    }
}
