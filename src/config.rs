//! Relay configuration

use crate::error::RelayError;

/// Default listen address
pub const DEFAULT_ADDR: &str = "localhost:3000";

/// Channel buffer size for relayed chat messages
pub const DEFAULT_MESSAGE_CAPACITY: usize = 128;

/// Payloads a connection may have waiting before it counts as overflowed
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Host and port to listen on
    pub addr: String,
    /// Capacity of the broker's chat message intake
    pub message_capacity: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Build from command line arguments (program name already skipped)
    ///
    /// The first argument, if any, overrides the listen address.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(addr) = args.into_iter().next() {
            config.addr = addr;
        }
        config
    }

    /// Reject values the channels cannot be built with
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.addr.is_empty() {
            return Err(RelayError::Config("listen address is empty".to_string()));
        }
        if self.message_capacity == 0 {
            return Err(RelayError::Config(
                "message capacity must be non-zero".to_string(),
            ));
        }
        if self.outbound_capacity == 0 {
            return Err(RelayError::Config(
                "outbound capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
