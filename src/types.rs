//! Basic type definitions for the chat relay
//!
//! Provides the `ConnectionId` newtype and the allocator that hands
//! identities out in accept order.

/// Unique connection identifier (newtype pattern)
///
/// Identities start at 1 and are never reused, even after the
/// connection that held one has disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strictly increasing identity source, owned by the listener
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next identity
    pub fn next_id(&mut self) -> ConnectionId {
        self.last += 1;
        ConnectionId(self.last)
    }
}
