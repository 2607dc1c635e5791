//! TCP Chat Relay - Entry Point
//!
//! Binds the listener, starts the Broker actor and accepts connections.

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{Broker, Listener, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Bind address from command line or default
    let config = RelayConfig::from_args(env::args().skip(1));
    config.validate()?;

    let (broker, intake) = Broker::new(config.message_capacity);

    let listener = match Listener::bind(&config, intake).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    info!("Chat relay listening on {}", listener.local_addr()?);

    tokio::spawn(broker.run());

    listener.run().await;
    Ok(())
}
