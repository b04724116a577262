//! flux-bridge — standalone WebSocket broadcast relay.
//!
//! Forwards every frame it receives to all other connected participants.
//!
//! Usage: `flux-bridge [port]` (default 8787). Runs until the process is
//! terminated; there is no graceful shutdown sequence.

use flux_relay::server::{RelayConfig, RelayServer};
use log::error;

const DEFAULT_PORT: u16 = 8787;

#[tokio::main]
async fn main() {
    env_logger::init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let config = RelayConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        ..RelayConfig::default()
    };
    let server = RelayServer::new(config);

    println!("flux-bridge listening on {port}");

    if let Err(e) = server.run().await {
        error!("Relay terminated: {e}");
        std::process::exit(1);
    }
}
