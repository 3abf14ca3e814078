//! Protocol message definitions
//!
//! Defines the rendezvous handshake records and the peer command set.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use super::{CodecError, INVALID_REQUEST_PREFIX, MAX_NAME_LEN, NAME_IN_USE};
use crate::game::{Move, Stone};

/// Display name validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Display name must not be empty")]
    Empty,

    #[error("Display name too long: {len} characters (max: {max})")]
    TooLong { len: usize, max: usize },

    #[error("Display name may only contain lowercase letters a-z, found {0:?}")]
    InvalidChar(char),
}

/// A validated player display name
///
/// Non-empty, at most [`MAX_NAME_LEN`] characters, lowercase ASCII letters only.
/// The restricted alphabet also keeps the name free of the `:` separator used
/// by the rendezvous handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }

        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(NameError::TooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }

        if let Some(c) = name.chars().find(|c| !c.is_ascii_lowercase()) {
            return Err(NameError::InvalidChar(c));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turn order handed out by the rendezvous server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TurnOrder {
    First = 0,
    Second = 1,
}

impl TurnOrder {
    /// Wire code (`0` or `1`)
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TurnOrder::First),
            1 => Some(TurnOrder::Second),
            _ => None,
        }
    }

    /// The order assigned to the opponent
    pub fn other(self) -> Self {
        match self {
            TurnOrder::First => TurnOrder::Second,
            TurnOrder::Second => TurnOrder::First,
        }
    }

    /// Whether a player with this order moves on the given turn index.
    /// FIRST moves on even indices, SECOND on odd ones.
    pub fn moves_on(self, turn_index: u32) -> bool {
        (turn_index % 2) as u8 == self.code()
    }

    /// Stone color played by this seat; black always opens
    pub fn stone(self) -> Stone {
        match self {
            TurnOrder::First => Stone::Black,
            TurnOrder::Second => Stone::White,
        }
    }
}

impl fmt::Display for TurnOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnOrder::First => f.write_str("first"),
            TurnOrder::Second => f.write_str("second"),
        }
    }
}

/// Pairing request sent by a client: `<name>:<listen port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub name: DisplayName,
    /// Port the client's peer socket listens on
    pub listen_port: u16,
}

impl RegisterRequest {
    pub fn new(name: DisplayName, listen_port: u16) -> Self {
        Self { name, listen_port }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.name, self.listen_port)
    }

    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let (name, port) = line
            .trim()
            .split_once(':')
            .ok_or_else(|| CodecError::Malformed(format!("expected <name>:<port>, got {:?}", line)))?;

        let name = DisplayName::parse(name)?;
        let listen_port = port
            .parse::<u16>()
            .map_err(|_| CodecError::Malformed(format!("invalid port {:?}", port)))?;

        Ok(Self { name, listen_port })
    }
}

/// Opponent details delivered to each paired client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub opponent_name: DisplayName,
    /// Where the opponent's peer socket listens
    pub opponent_addr: SocketAddr,
    /// Turn order of the receiving client
    pub turn_order: TurnOrder,
}

impl MatchAssignment {
    pub fn opponent_turn_order(&self) -> TurnOrder {
        self.turn_order.other()
    }

    /// `<opponent>:<ip>:<port>:<my turn>:<opponent turn>`
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.opponent_name,
            self.opponent_addr.ip(),
            self.opponent_addr.port(),
            self.turn_order.code(),
            self.opponent_turn_order().code(),
        )
    }

    /// Parses a success response. The IP sits in the middle and may itself
    /// contain colons (IPv6), so fields are taken from both ends.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let line = line.trim();
        let malformed = || CodecError::Malformed(format!("invalid match assignment {:?}", line));

        let (name, rest) = line.split_once(':').ok_or_else(malformed)?;
        let mut tail = rest.rsplitn(4, ':');
        let opponent_turn = tail.next().ok_or_else(malformed)?;
        let my_turn = tail.next().ok_or_else(malformed)?;
        let port = tail.next().ok_or_else(malformed)?;
        let ip = tail.next().ok_or_else(malformed)?;

        let opponent_name = DisplayName::parse(name)?;
        let ip: IpAddr = ip.parse().map_err(|_| malformed())?;
        let port: u16 = port.parse().map_err(|_| malformed())?;
        let turn_order = parse_turn_order(my_turn).ok_or_else(malformed)?;
        let opponent_turn_order = parse_turn_order(opponent_turn).ok_or_else(malformed)?;

        if opponent_turn_order != turn_order.other() {
            return Err(CodecError::Malformed(format!(
                "turn orders are not complementary: {} / {}",
                my_turn, opponent_turn
            )));
        }

        Ok(Self {
            opponent_name,
            opponent_addr: SocketAddr::new(ip, port),
            turn_order,
        })
    }
}

fn parse_turn_order(field: &str) -> Option<TurnOrder> {
    field.parse::<u8>().ok().and_then(TurnOrder::from_code)
}

/// Any response line the rendezvous server may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousReply {
    Matched(MatchAssignment),
    NameInUse,
    Invalid(String),
}

impl RendezvousReply {
    pub fn encode(&self) -> String {
        match self {
            RendezvousReply::Matched(assignment) => assignment.encode(),
            RendezvousReply::NameInUse => NAME_IN_USE.to_string(),
            RendezvousReply::Invalid(reason) => format!("{}: {}", INVALID_REQUEST_PREFIX, reason),
        }
    }

    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let line = line.trim();
        if line == NAME_IN_USE {
            return Ok(RendezvousReply::NameInUse);
        }
        if let Some(reason) = line.strip_prefix(INVALID_REQUEST_PREFIX) {
            let reason = reason.trim_start_matches(':').trim();
            return Ok(RendezvousReply::Invalid(reason.to_string()));
        }
        MatchAssignment::parse(line).map(RendezvousReply::Matched)
    }
}

/// Commands exchanged between the two peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// A stone was placed by the sender
    Move(Move),

    /// Sender left the match
    Exit,

    /// Sender conceded ("GG"), also sent when its turn timer expired
    Resign,

    /// Free text shown to the other player
    Chat { text: String },
}

impl PeerMessage {
    /// Get the command code
    pub fn type_id(&self) -> u8 {
        match self {
            PeerMessage::Move(_) => 0,
            PeerMessage::Exit => 1,
            PeerMessage::Resign => 2,
            PeerMessage::Chat { .. } => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_rules() {
        assert!(DisplayName::parse("alice").is_ok());
        assert_eq!(DisplayName::parse(""), Err(NameError::Empty));
        assert_eq!(DisplayName::parse("Alice"), Err(NameError::InvalidChar('A')));
        assert_eq!(DisplayName::parse("bob1"), Err(NameError::InvalidChar('1')));
        assert_eq!(DisplayName::parse("a:b"), Err(NameError::InvalidChar(':')));

        let longest = "z".repeat(MAX_NAME_LEN);
        assert!(DisplayName::parse(&longest).is_ok());
        assert_eq!(
            DisplayName::parse(&format!("{}z", longest)),
            Err(NameError::TooLong { len: 65, max: 64 })
        );
    }

    #[test]
    fn test_turn_parity() {
        assert!(TurnOrder::First.moves_on(0));
        assert!(!TurnOrder::First.moves_on(1));
        assert!(TurnOrder::Second.moves_on(1));
        assert!(TurnOrder::Second.moves_on(42 + 1));
        assert_eq!(TurnOrder::First.other(), TurnOrder::Second);
    }

    #[test]
    fn test_register_request_parse() {
        let req = RegisterRequest::parse("alice:40001\n").unwrap();
        assert_eq!(req.name.as_str(), "alice");
        assert_eq!(req.listen_port, 40001);

        assert!(RegisterRequest::parse("alice").is_err());
        assert!(RegisterRequest::parse("alice:notaport").is_err());
        assert!(matches!(
            RegisterRequest::parse("Alice:1"),
            Err(CodecError::InvalidName(NameError::InvalidChar('A')))
        ));
    }

    #[test]
    fn test_assignment_wire_format() {
        let assignment = MatchAssignment {
            opponent_name: DisplayName::parse("bob").unwrap(),
            opponent_addr: "127.0.0.1:40002".parse().unwrap(),
            turn_order: TurnOrder::First,
        };
        assert_eq!(assignment.encode(), "bob:127.0.0.1:40002:0:1");
    }

    #[test]
    fn test_assignment_parse_ipv6() {
        let parsed = MatchAssignment::parse("bob:::1:40002:1:0").unwrap();
        assert_eq!(parsed.opponent_addr, "[::1]:40002".parse().unwrap());
        assert_eq!(parsed.turn_order, TurnOrder::Second);
    }

    #[test]
    fn test_assignment_rejects_same_turn_order() {
        assert!(MatchAssignment::parse("bob:127.0.0.1:40002:0:0").is_err());
        assert!(MatchAssignment::parse("bob:127.0.0.1:40002:0").is_err());
    }

    #[test]
    fn test_reply_variants() {
        assert_eq!(
            RendezvousReply::parse("Nickname is already used").unwrap(),
            RendezvousReply::NameInUse
        );
        assert_eq!(
            RendezvousReply::parse("Invalid request: bad port").unwrap(),
            RendezvousReply::Invalid("bad port".to_string())
        );
        assert_eq!(
            RendezvousReply::Invalid("bad port".to_string()).encode(),
            "Invalid request: bad port"
        );
    }
}
