//! Rendezvous Client
//!
//! Registers a player with the rendezvous server and waits for an opponent.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::protocol::{
    read_line, write_line, CodecError, DisplayName, MatchAssignment, NameError, RegisterRequest,
    RendezvousReply,
};

/// Client errors
#[derive(Error, Debug)]
pub enum RendezvousError {
    #[error("Invalid display name: {0}")]
    InvalidName(#[from] NameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Nickname is already used: {0}")]
    NameInUse(DisplayName),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Server closed the connection before pairing")]
    Closed,
}

pub type RendezvousResult<T> = Result<T, RendezvousError>;

/// OmokNet rendezvous client
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    /// Rendezvous server address
    server_addr: SocketAddr,
    /// Connection timeout
    connect_timeout: Duration,
}

impl RendezvousClient {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            connect_timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Register under `name`, advertising `listen_port` for the peer
    /// protocol, and wait until the server pairs us.
    ///
    /// The name is validated before anything touches the network.
    pub async fn register(&self, name: &str, listen_port: u16) -> RendezvousResult<MatchAssignment> {
        let name = DisplayName::parse(name)?;

        tracing::info!("Connecting to rendezvous server at {}", self.server_addr);

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.server_addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(RendezvousError::Io(e)),
            Err(_) => return Err(RendezvousError::Timeout),
        };

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = RegisterRequest::new(name.clone(), listen_port);
        write_line(&mut writer, &request.encode()).await?;
        tracing::info!("Registered as {}, waiting for an opponent", name);

        let line = read_line(&mut reader).await?.ok_or(RendezvousError::Closed)?;

        match RendezvousReply::parse(&line)? {
            RendezvousReply::Matched(assignment) => {
                tracing::info!(
                    "Matched with {} at {}, playing {}",
                    assignment.opponent_name,
                    assignment.opponent_addr,
                    assignment.turn_order
                );
                Ok(assignment)
            }
            RendezvousReply::NameInUse => Err(RendezvousError::NameInUse(name)),
            RendezvousReply::Invalid(reason) => Err(RendezvousError::Rejected(reason)),
        }
    }
}
