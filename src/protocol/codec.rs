//! Protocol codec for encoding/decoding messages
//!
//! Peer messages are plain text, one command per datagram. Rendezvous
//! messages are newline-terminated lines on a TCP stream.

use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{NameError, PeerMessage, MAX_DATAGRAM_SIZE};
use crate::game::Move;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Empty message")]
    Empty,

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),

    #[error("Invalid display name: {0}")]
    InvalidName(#[from] NameError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Encode a peer message into a datagram payload
pub fn encode_message(message: &PeerMessage, buf: &mut BytesMut) -> Result<(), CodecError> {
    let text = match message {
        PeerMessage::Move(mv) => format!("{} {} {}", message.type_id(), mv.x, mv.y),
        PeerMessage::Exit | PeerMessage::Resign => message.type_id().to_string(),
        PeerMessage::Chat { text } => format!("{} {}", message.type_id(), text),
    };

    if text.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::MessageTooLarge(text.len(), MAX_DATAGRAM_SIZE));
    }

    buf.put_slice(text.as_bytes());
    Ok(())
}

/// Decode one datagram. Surrounding whitespace is ignored.
pub fn decode_message(datagram: &[u8]) -> Result<PeerMessage, CodecError> {
    if datagram.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::MessageTooLarge(datagram.len(), MAX_DATAGRAM_SIZE));
    }

    let text = std::str::from_utf8(datagram)?.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }

    let (code, rest) = match text.split_once(' ') {
        Some((code, rest)) => (code, rest),
        None => (text, ""),
    };

    match code {
        "0" => {
            let mut fields = rest.split_whitespace();
            let (x, y) = match (fields.next(), fields.next(), fields.next()) {
                (Some(x), Some(y), None) => (x, y),
                _ => {
                    return Err(CodecError::Malformed(format!(
                        "move expects two coordinates, got {:?}",
                        rest
                    )))
                }
            };
            let x = parse_coordinate(x)?;
            let y = parse_coordinate(y)?;
            Ok(PeerMessage::Move(Move::new(x, y)))
        }
        "1" => Ok(PeerMessage::Exit),
        "2" => Ok(PeerMessage::Resign),
        "3" => Ok(PeerMessage::Chat {
            text: rest.to_string(),
        }),
        other => Err(CodecError::UnknownCommand(other.to_string())),
    }
}

fn parse_coordinate(field: &str) -> Result<i32, CodecError> {
    field
        .parse::<i32>()
        .map_err(|_| CodecError::Malformed(format!("invalid coordinate {:?}", field)))
}

/// Read one rendezvous line. Returns `Ok(None)` on a clean close; a final
/// line without terminator is returned as-is.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader)
        .take(MAX_DATAGRAM_SIZE as u64)
        .read_line(&mut line)
        .await?;

    if n == 0 {
        return Ok(None);
    }

    if !line.ends_with('\n') && n >= MAX_DATAGRAM_SIZE {
        return Err(CodecError::MessageTooLarge(n, MAX_DATAGRAM_SIZE));
    }

    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

/// Write one rendezvous line and flush it
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn encoded(message: &PeerMessage) -> String {
        let mut buf = BytesMut::new();
        encode_message(message, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(encoded(&PeerMessage::Move(Move::new(3, 7))), "0 3 7");
        assert_eq!(encoded(&PeerMessage::Exit), "1");
        assert_eq!(encoded(&PeerMessage::Resign), "2");
        assert_eq!(
            encoded(&PeerMessage::Chat {
                text: "good luck".to_string()
            }),
            "3 good luck"
        );
    }

    #[test]
    fn test_decode_trims_and_keeps_chat_verbatim() {
        assert_eq!(
            decode_message(b"0 4 5\n").unwrap(),
            PeerMessage::Move(Move::new(4, 5))
        );
        assert_eq!(
            decode_message(b"3 hi  there\n").unwrap(),
            PeerMessage::Chat {
                text: "hi  there".to_string()
            }
        );
        assert_eq!(decode_message(b" 2 ").unwrap(), PeerMessage::Resign);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_message(b""), Err(CodecError::Empty)));
        assert!(matches!(decode_message(b"  \n"), Err(CodecError::Empty)));
        assert!(matches!(decode_message(b"9"), Err(CodecError::UnknownCommand(c)) if c == "9"));
        assert!(matches!(decode_message(b"0 1"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode_message(b"0 a b"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode_message(b"0 1 2 3"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode_message(&[0xff, 0xfe]), Err(CodecError::InvalidUtf8(_))));
    }

    #[test]
    fn test_negative_coordinates_decode() {
        // Bounds are the session's concern, not the codec's
        assert_eq!(
            decode_message(b"0 -1 4").unwrap(),
            PeerMessage::Move(Move::new(-1, 4))
        );
    }

    #[test]
    fn test_oversized_chat_rejected() {
        let message = PeerMessage::Chat {
            text: "x".repeat(MAX_DATAGRAM_SIZE),
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_message(&message, &mut buf),
            Err(CodecError::MessageTooLarge(_, _))
        ));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_line_framing() {
        let mut out = Vec::new();
        write_line(&mut out, "alice:40001").await.unwrap();
        assert_eq!(out, b"alice:40001\n");

        let mut reader = BufReader::new(&b"first\r\nsecond"[..]);
        assert_eq!(read_line(&mut reader).await.unwrap().as_deref(), Some("first"));
        assert_eq!(read_line(&mut reader).await.unwrap().as_deref(), Some("second"));
        assert_eq!(read_line(&mut reader).await.unwrap(), None);
    }
}
