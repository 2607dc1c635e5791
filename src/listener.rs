//! TCP accept loop
//!
//! Accepts sockets, assigns identities in accept order and hands each new
//! connection to the broker. Loops are started by the broker, not here.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::message::{Intake, LifecycleEvent};
use crate::types::IdAllocator;

/// Accepts TCP clients and reports them to the broker
pub struct Listener {
    listener: TcpListener,
    ids: IdAllocator,
    intake: Intake,
    outbound_capacity: usize,
}

impl Listener {
    /// Bind the configured address
    ///
    /// Failure here is fatal for the relay.
    pub async fn bind(config: &RelayConfig, intake: Intake) -> Result<Self, RelayError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            ids: IdAllocator::new(),
            intake,
            outbound_capacity: config.outbound_capacity,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the broker goes away
    ///
    /// Accept errors are logged and never end the loop.
    pub async fn run(mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    if !self.register(stream, peer) {
                        warn!("Broker stopped, listener exiting");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> bool {
        let id = self.ids.next_id();
        info!("Connection {} accepted from {}", id, peer);

        let connection = Connection::new(id, stream, self.intake.clone(), self.outbound_capacity);
        self.intake.report(LifecycleEvent::Connected(connection))
    }
}
