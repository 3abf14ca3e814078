//! Network module - Handles rendezvous and peer communication
//!
//! Provides:
//! - Rendezvous server pairing waiting clients (TCP)
//! - Rendezvous client used by players to find an opponent
//! - Peer links carrying the match protocol (UDP)

mod server;
mod client;
mod connection;
pub mod lobby;

pub use server::*;
pub use client::*;
pub use connection::*;
pub use lobby::{Lobby, LobbyError, Registration, WaitingEntry};

use std::net::SocketAddr;

use crate::config::Config;
use crate::protocol::DEFAULT_RENDEZVOUS_PORT;

/// Configuration for the rendezvous server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub bind_address: String,
    /// Port to listen on (0 = any free port)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_RENDEZVOUS_PORT,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_address: config.network.bind_address.clone(),
            port: config.rendezvous.port,
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    fn bind_target(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
