//! Peer connection handling for OmokNet
//!
//! Carries the match protocol between the two players:
//! - Datagram transports (UDP, or an in-memory pair)
//! - Message encoding/decoding
//! - Connection statistics and closed-state tracking

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::{decode_message, encode_message, CodecError, PeerMessage, MAX_DATAGRAM_SIZE};

/// Connection errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Connection closed")]
    Closed,
}

impl LinkError {
    /// Whether the peer should be considered gone. Protocol errors only
    /// affect the offending datagram.
    pub fn is_peer_lost(&self) -> bool {
        !matches!(self, LinkError::Protocol(_))
    }
}

pub type LinkResult<T> = Result<T, LinkError>;

/// A bidirectional, message-preserving transport to one peer
#[async_trait]
pub trait PeerLink: Send + Sync + 'static {
    /// Send one datagram
    async fn send_datagram(&self, payload: &[u8]) -> io::Result<()>;

    /// Receive one datagram into `buf`, returning its length
    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Address of the remote end, if known
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// UDP socket bound locally and connected to the opponent
pub struct UdpLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpLink {
    /// Bind the local peer socket. Done before registering with the
    /// rendezvous server so the advertised port is already listening.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, peer: None })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Restrict traffic to the opponent's address
    pub async fn connect(&mut self, peer: SocketAddr) -> io::Result<()> {
        self.socket.connect(peer).await?;
        self.peer = Some(peer);
        Ok(())
    }
}

#[async_trait]
impl PeerLink for UdpLink {
    async fn send_datagram(&self, payload: &[u8]) -> io::Result<()> {
        self.socket.send(payload).await?;
        Ok(())
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

/// In-process link, one half of a connected pair
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryLink {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        (
            Self {
                tx: a_tx,
                rx: Mutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl PeerLink for MemoryLink {
    async fn send_datagram(&self, payload: &[u8]) -> io::Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer link closed"))
    }

    async fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = self.rx.lock().await.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "peer link closed")
        })?;

        // Truncate like a real datagram socket would
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}

/// Connection statistics
#[derive(Debug, Default)]
pub struct ConnectionStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ConnectionStats {
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Datagrams discarded because they failed to decode
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

/// Message-level connection to the opponent
pub struct Connection {
    link: Box<dyn PeerLink>,
    closed: AtomicBool,
    stats: ConnectionStats,
}

impl Connection {
    pub fn new(link: impl PeerLink) -> Self {
        Self {
            link: Box::new(link),
            closed: AtomicBool::new(false),
            stats: ConnectionStats::default(),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.link.peer_addr()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Send a message. Any failure marks the connection closed.
    pub async fn send(&self, message: &PeerMessage) -> LinkResult<()> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }

        let mut buf = BytesMut::with_capacity(64);
        encode_message(message, &mut buf)?;

        if let Err(e) = self.link.send_datagram(&buf).await {
            self.mark_closed();
            return Err(LinkError::Io(e));
        }

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Sent {:?}", message);
        Ok(())
    }

    /// Receive the next message. A [`LinkError::Protocol`] means one bad
    /// datagram was dropped and the caller may keep receiving.
    pub async fn recv(&self) -> LinkResult<PeerMessage> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }

        // One spare byte so an oversized datagram is detected, not truncated
        let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];
        let n = match self.link.recv_datagram(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                self.mark_closed();
                return Err(LinkError::Io(e));
            }
        };

        match decode_message(&buf[..n]) {
            Ok(message) => {
                self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Received {:?}", message);
                Ok(message)
            }
            Err(e) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                Err(LinkError::Protocol(e))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
