//! Connection definition
//!
//! A `Connection` is one accepted byte stream plus its identity and
//! outbound queue. The broker keeps only a `ConnectionHandle`; the stream
//! itself is owned by the two loops started in `Connection::spawn`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::EnqueueError;
use crate::handler;
use crate::message::{Intake, LifecycleEvent};
use crate::types::ConnectionId;

/// Bidirectional byte stream a connection can be built on
///
/// Implemented for every `AsyncRead + AsyncWrite` type that can move
/// between tasks: TCP streams in production, in-memory pipes in tests.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

struct Shared {
    id: ConnectionId,
    open: AtomicBool,
    closed: watch::Sender<bool>,
    intake: Intake,
}

/// Cloneable reference to a live connection
///
/// Carries the sending side of the outbound queue and the teardown guard.
/// It never owns the underlying stream.
///
/// Both loops hold a handle as well, so the queue never closes from the
/// sending side. It is closed only from the receiving end, by the outbound
/// loop after teardown has signalled.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Bytes>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// False once teardown has started
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Enqueue a payload without waiting
    pub fn try_enqueue(&self, payload: Bytes) -> Result<(), EnqueueError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Tear the connection down
    ///
    /// Safe to call any number of times from any task. Only the first call
    /// reports `Disconnected` and wakes both loops so they release the
    /// stream and the queue. Returns true for that first call.
    pub fn close(&self) -> bool {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        debug!("Tearing down connection {}", self.shared.id);
        self.shared
            .intake
            .report(LifecycleEvent::Disconnected(self.shared.id));
        self.shared.closed.send_replace(true);
        true
    }

    pub(crate) fn intake(&self) -> &Intake {
        &self.shared.intake
    }

    /// Receiver that flips to `true` when teardown runs
    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.shared.closed.subscribe()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// An accepted, not yet running connection
pub struct Connection {
    handle: ConnectionHandle,
    stream: Box<dyn ByteStream>,
    outbound_rx: mpsc::Receiver<Bytes>,
}

impl Connection {
    /// Wrap an accepted stream
    ///
    /// `intake` is the route back to the broker used by the inbound loop and
    /// by teardown. `outbound_capacity` bounds the queue of payloads waiting
    /// to be written and must be non-zero.
    pub fn new<S: ByteStream>(
        id: ConnectionId,
        stream: S,
        intake: Intake,
        outbound_capacity: usize,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(outbound_capacity);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            id,
            open: AtomicBool::new(true),
            closed,
            intake,
        });

        Self {
            handle: ConnectionHandle { shared, outbound },
            stream: Box::new(stream),
            outbound_rx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Start the inbound and outbound loops
    ///
    /// Returns the (inbound, outbound) task handles. Both tasks finish once
    /// teardown has run.
    pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
        let (reader, writer) = tokio::io::split(self.stream);

        let inbound = tokio::spawn(handler::inbound_loop(self.handle.clone(), reader));
        let outbound = tokio::spawn(handler::outbound_loop(
            self.handle,
            writer,
            self.outbound_rx,
        ));

        (inbound, outbound)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.handle.id())
            .finish_non_exhaustive()
    }
}
