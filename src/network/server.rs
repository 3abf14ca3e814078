//! Rendezvous Server
//!
//! Accepts pairing requests from players and introduces them to each other
//! two at a time. Once paired, players talk directly and the server forgets
//! them.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

use super::lobby::{Lobby, LobbyError};
use super::ServerConfig;
use crate::protocol::{read_line, write_line, CodecError, DisplayName, RegisterRequest, RendezvousReply};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Events emitted by the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Server started
    Started {
        bind_addr: SocketAddr,
    },
    /// A player joined the waiting set
    Registered {
        name: DisplayName,
        addr: SocketAddr,
    },
    /// A request was refused (duplicate name or malformed handshake)
    Rejected {
        addr: SocketAddr,
        reason: String,
    },
    /// Two players were paired; `first` moves first
    Paired {
        first: DisplayName,
        second: DisplayName,
    },
    /// A paired player could not be told about its match
    AnnounceFailed {
        name: DisplayName,
        reason: String,
    },
    /// A waiting player hung up before being paired
    Left {
        name: DisplayName,
    },
    /// Server stopped
    Stopped,
    /// Error occurred
    Error {
        message: String,
    },
}

/// OmokNet rendezvous server
pub struct RendezvousServer {
    /// Server configuration
    config: ServerConfig,
    /// Players waiting for an opponent
    lobby: Arc<Lobby>,
    /// Event sender
    event_tx: mpsc::Sender<ServerEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Whether the server is running
    running: Arc<RwLock<bool>>,
}

impl RendezvousServer {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            config,
            lobby: Arc::new(Lobby::new()),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Start the server, returning the bound address
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        {
            let running = self.running.read().await;
            if *running {
                return Err(ServerError::AlreadyRunning);
            }
        }

        let bind_addr = self.config.bind_target();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        tracing::info!("Rendezvous server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        {
            let mut running = self.running.write().await;
            *running = true;
        }

        emit(&self.event_tx, ServerEvent::Started { bind_addr: local_addr });

        let lobby = self.lobby.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();

        // Spawn the accept loop
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::debug!("New connection from {}", addr);

                                let lobby = lobby.clone();
                                let event_tx = event_tx.clone();

                                tokio::spawn(async move {
                                    if let Err(e) = handle_client(stream, addr, lobby, event_tx.clone()).await {
                                        tracing::error!("Client handler error ({}): {}", addr, e);
                                        emit(&event_tx, ServerEvent::Error {
                                            message: format!("{}: {}", addr, e),
                                        });
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Server shutdown requested");
                        break;
                    }
                }
            }

            let dropped = lobby.clear().await;
            if dropped > 0 {
                tracing::info!("Dropped {} waiting player(s)", dropped);
            }

            let mut running = running.write().await;
            *running = false;

            emit(&event_tx, ServerEvent::Stopped);
        });

        Ok(local_addr)
    }

    /// Stop the server
    pub async fn stop(&mut self) -> ServerResult<()> {
        {
            let running = self.running.read().await;
            if !*running {
                return Err(ServerError::NotRunning);
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        Ok(())
    }

    /// Number of players currently waiting
    pub async fn waiting_count(&self) -> usize {
        self.lobby.waiting_len().await
    }

    /// Check if the server is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Queue an event without ever blocking a handler on a slow consumer
fn emit(event_tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = event_tx.try_send(event) {
        tracing::warn!("Event queue full, dropping {:?}", event);
    }
}

/// Handle one pairing request
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    lobby: Arc<Lobby>,
    event_tx: mpsc::Sender<ServerEvent>,
) -> ServerResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let line = match read_line(&mut reader).await? {
        Some(line) => line,
        None => {
            tracing::debug!("{} closed before sending a request", addr);
            return Ok(());
        }
    };
    tracing::debug!("Request from {}: {:?}", addr, line);

    let request = match RegisterRequest::parse(&line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Invalid request from {}: {}", addr, e);
            let reply = RendezvousReply::Invalid(e.to_string());
            write_line(&mut writer, &reply.encode()).await?;
            emit(&event_tx, ServerEvent::Rejected {
                addr,
                reason: e.to_string(),
            });
            return Ok(());
        }
    };

    // Peers reach each other at the address the server saw, on the port
    // they asked for
    let callback = SocketAddr::new(addr.ip(), request.listen_port);

    let registration = match lobby.try_register_and_pair(request.name.clone(), callback).await {
        Ok(registration) => registration,
        Err(e @ LobbyError::NameInUse(_)) => {
            tracing::info!("Rejected {}: {}", addr, e);
            write_line(&mut writer, &RendezvousReply::NameInUse.encode()).await?;
            emit(&event_tx, ServerEvent::Rejected {
                addr,
                reason: e.to_string(),
            });
            return Ok(());
        }
    };

    let name = registration.entry.name.clone();
    tracing::info!("{} is waiting ({})", name, callback);
    emit(&event_tx, ServerEvent::Registered {
        name: name.clone(),
        addr: callback,
    });

    if let Some(pairing) = &registration.pairing {
        tracing::info!("Paired {} (first) with {} (second)", pairing.first.name, pairing.second.name);
        emit(&event_tx, ServerEvent::Paired {
            first: pairing.first.name.clone(),
            second: pairing.second.name.clone(),
        });
        for gone in &pairing.undelivered {
            emit(&event_tx, ServerEvent::AnnounceFailed {
                name: gone.clone(),
                reason: "registration handler already finished".to_string(),
            });
        }
    }

    // Wait for an opponent while watching for the client hanging up
    let mut assignment_rx = registration.assignment;
    let mut probe = [0u8; 64];
    let assignment = loop {
        tokio::select! {
            result = &mut assignment_rx => {
                match result {
                    Ok(assignment) => break assignment,
                    Err(_) => {
                        tracing::info!("Waiting set cleared, releasing {}", name);
                        return Ok(());
                    }
                }
            }
            read = reader.read(&mut probe) => {
                match read {
                    Ok(n) if n > 0 => continue,
                    _ => {
                        if lobby.withdraw(registration.entry.id).await.is_some() {
                            tracing::info!("{} left before being paired", name);
                            emit(&event_tx, ServerEvent::Left { name });
                        } else if assignment_rx.try_recv().is_ok() {
                            tracing::warn!("{} disconnected right after being paired", name);
                            emit(&event_tx, ServerEvent::AnnounceFailed {
                                name,
                                reason: "client disconnected".to_string(),
                            });
                        }
                        return Ok(());
                    }
                }
            }
        }
    };

    let reply = RendezvousReply::Matched(assignment);
    if let Err(e) = write_line(&mut writer, &reply.encode()).await {
        tracing::warn!("Could not announce match to {}: {}", name, e);
        emit(&event_tx, ServerEvent::AnnounceFailed {
            name,
            reason: e.to_string(),
        });
        return Ok(());
    }

    tracing::debug!("Announced match to {}", name);
    Ok(())
}
