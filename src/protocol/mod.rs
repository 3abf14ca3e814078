//! Protocol module - Defines the wire formats used by OmokNet
//!
//! Two formats live here:
//! - The rendezvous handshake: colon-separated text lines over TCP
//! - The peer protocol: one space-separated command per UDP datagram
//!
//! ```text
//! request   <name>:<listen port>
//! response  <opponent>:<ip>:<port>:<my turn>:<opponent turn>
//! peer      0 <x> <y> | 1 | 2 | 3 <text>
//! ```

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default port for the rendezvous server
pub const DEFAULT_RENDEZVOUS_PORT: u16 = 30000;

/// Largest datagram accepted or produced by the peer protocol
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Maximum length of a display name
pub const MAX_NAME_LEN: usize = 64;

/// Rejection sent by the rendezvous server for a duplicate display name
pub const NAME_IN_USE: &str = "Nickname is already used";

/// Prefix of the rejection sent for a malformed rendezvous request
pub const INVALID_REQUEST_PREFIX: &str = "Invalid request";
