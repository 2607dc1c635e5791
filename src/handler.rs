//! Per-connection loops
//!
//! The inbound loop relays whatever each read returns to the broker; the
//! outbound loop drains the connection's queue onto the stream. Either loop
//! ending runs teardown, and teardown wakes the other one.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::message::ChatMessage;

/// Maximum bytes taken from the stream per read
pub const READ_CHUNK_SIZE: usize = 1024;

/// Read from the stream and forward every chunk as one chat message
///
/// No framing: a chunk may hold part of a line or several lines. End of
/// stream and read errors both end the connection.
pub(crate) async fn inbound_loop<R>(handle: ConnectionHandle, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let id = handle.id();
    let mut closed = handle.closed_signal();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Connection {} closed by peer", id);
                break;
            }
            Ok(n) => {
                let message = ChatMessage {
                    from: id,
                    payload: Bytes::copy_from_slice(&buf[..n]),
                };
                if !handle.intake().relay(message).await {
                    debug!("Broker stopped, ending inbound loop for {}", id);
                    break;
                }
            }
            Err(e) => {
                debug!("Read from connection {} failed: {}", id, e);
                break;
            }
        }
    }

    handle.close();
    debug!("Inbound loop ended for {}", id);
}

/// Write queued payloads to the stream in enqueue order
///
/// Owns the write half, so closing the stream happens here: once the loop
/// ends the queue is closed and the write half is shut down.
pub(crate) async fn outbound_loop<W>(
    handle: ConnectionHandle,
    mut writer: W,
    mut queue: mpsc::Receiver<Bytes>,
) where
    W: AsyncWrite + Unpin,
{
    let id = handle.id();
    let mut closed = handle.closed_signal();

    loop {
        let payload = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break,
            next = queue.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        // A stalled peer must not keep the loop alive past teardown
        let written = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break,
            written = writer.write_all(&payload) => written,
        };

        if let Err(e) = written {
            warn!("Write to connection {} failed: {}", id, e);
            break;
        }
    }

    queue.close();
    handle.close();
    let _ = writer.shutdown().await;
    debug!("Outbound loop ended for {}", id);
}
