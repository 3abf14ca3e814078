//! OmokNet - Peer-to-peer omok
//!
//! A rendezvous server introduces two players; after that they play five in a
//! row directly against each other over UDP, each side keeping its own board.

pub mod config;
pub mod game;
pub mod network;
pub mod protocol;
pub mod session;
