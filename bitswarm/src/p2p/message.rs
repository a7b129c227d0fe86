use std::io::{Read, Write};

use bytes::{Buf, BufMut};

use super::PeerError;

#[cfg_attr(test, derive(Debug, Clone, PartialEq, Eq))]
pub enum Message {

    // length == 0, no type byte follows.
    KeepAlive,

    Choke,
    Unchoke,
    Interested,
    NotInterested,

    Have { index: u32 },

    // MSB-first packed bitfield, one bit per piece.
    Bitfield(Vec<u8>),

    Request { index: u32, begin: u32, length: u32 },

    // This core always serves the complete piece as one `Piece` message;
    // `begin` is echoed from the request but `block` is the whole piece.
    Piece { index: u32, begin: u32, block: Vec<u8> },

    // Accepted on the wire, a no-op in this core (whole-piece transfer
    // has nothing in flight worth cancelling).
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {

    pub fn write_to(&self, w: &mut impl Write) -> std::io::Result<()> {
        let mut buf = Vec::new();
        match self {
            Message::KeepAlive => buf.put_u32(0),

            Message::Choke => { buf.put_u32(1); buf.put_u8(0); },
            Message::Unchoke => { buf.put_u32(1); buf.put_u8(1); },
            Message::Interested => { buf.put_u32(1); buf.put_u8(2); },
            Message::NotInterested => { buf.put_u32(1); buf.put_u8(3); },

            Message::Have { index } => {
                buf.put_u32(5);
                buf.put_u8(4);
                buf.put_u32(*index);
            },

            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(5);
                buf.extend_from_slice(bits);
            },

            Message::Request { index, begin, length } => {
                buf.put_u32(13);
                buf.put_u8(6);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            },

            Message::Piece { index, begin, block } => {
                buf.put_u32(9 + block.len() as u32);
                buf.put_u8(7);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.extend_from_slice(block);
            },

            Message::Cancel { index, begin, length } => {
                buf.put_u32(13);
                buf.put_u8(8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            },
        }
        w.write_all(&buf)
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self, PeerError> {
        let mut len_buf = [0u8; 4];
        r.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 {
            return Ok(Message::KeepAlive);
        }

        let mut body = vec![0u8; len];
        r.read_exact(&mut body)?;
        let mut cur = &body[..];

        let id = cur.get_u8();
        let needed = match id {
            0..=3 => 0,
            4 => 4,
            5 => 0,
            6 | 8 => 12,
            7 => 8,
            id => return Err(PeerError::InvalidMessageId(id)),
        };
        if cur.remaining() < needed {
            return Err(PeerError::MalformedMessage);
        }

        let msg = match id {
            0 => Message::Choke,
            1 => Message::Unchoke,
            2 => Message::Interested,
            3 => Message::NotInterested,
            4 => Message::Have { index: cur.get_u32() },
            5 => Message::Bitfield(cur.to_vec()),
            6 => {
                let index = cur.get_u32();
                let begin = cur.get_u32();
                let length = cur.get_u32();
                Message::Request { index, begin, length }
            },
            7 => {
                let index = cur.get_u32();
                let begin = cur.get_u32();
                Message::Piece { index, begin, block: cur.to_vec() }
            },
            8 => {
                let index = cur.get_u32();
                let begin = cur.get_u32();
                let length = cur.get_u32();
                Message::Cancel { index, begin, length }
            },
            _ => unreachable!("id validated above"),
        };
        Ok(msg)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::KeepAlive => write!(f, "keep-alive"),
            Message::Choke => write!(f, "choke"),
            Message::Unchoke => write!(f, "unchoke"),
            Message::Interested => write!(f, "interested"),
            Message::NotInterested => write!(f, "not interested"),
            Message::Have { index } => write!(f, "have({index})"),
            Message::Bitfield(bits) => write!(f, "bitfield({} bytes)", bits.len()),
            Message::Request { index, begin, length } => {
                write!(f, "request(index={index}, begin={begin}, length={length})")
            },
            Message::Piece { index, begin, block } => {
                write!(f, "piece(index={index}, begin={begin}, len={})", block.len())
            },
            Message::Cancel { index, begin, length } => {
                write!(f, "cancel(index={index}, begin={begin}, length={length})")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) -> Message {
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        Message::read_from(&mut cursor).unwrap()
    }

    #[test]
    fn round_trips_all_variants() {
        assert_eq!(round_trip(Message::KeepAlive), Message::KeepAlive);
        assert_eq!(round_trip(Message::Choke), Message::Choke);
        assert_eq!(round_trip(Message::Unchoke), Message::Unchoke);
        assert_eq!(round_trip(Message::Interested), Message::Interested);
        assert_eq!(round_trip(Message::NotInterested), Message::NotInterested);
        assert_eq!(round_trip(Message::Have { index: 7 }), Message::Have { index: 7 });
        assert_eq!(
            round_trip(Message::Bitfield(vec![0b1010_0000])),
            Message::Bitfield(vec![0b1010_0000]),
        );
        assert_eq!(
            round_trip(Message::Request { index: 1, begin: 0, length: 4 }),
            Message::Request { index: 1, begin: 0, length: 4 },
        );
        assert_eq!(
            round_trip(Message::Piece { index: 1, begin: 0, block: b"ABCD".to_vec() }),
            Message::Piece { index: 1, begin: 0, block: b"ABCD".to_vec() },
        );
        assert_eq!(
            round_trip(Message::Cancel { index: 1, begin: 0, length: 4 }),
            Message::Cancel { index: 1, begin: 0, length: 4 },
        );
    }

    #[test]
    fn rejects_unknown_message_id() {
        let mut buf = Vec::new();
        buf.put_u32(1);
        buf.put_u8(255);
        let mut cursor = std::io::Cursor::new(buf);
        let err = Message::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::InvalidMessageId(255)));
    }

    #[test]
    fn rejects_truncated_have_body_instead_of_panicking() {
        let mut buf = Vec::new();
        buf.put_u32(2);
        buf.put_u8(4);
        buf.put_u8(0);
        let mut cursor = std::io::Cursor::new(buf);
        let err = Message::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::MalformedMessage));
    }

    #[test]
    fn rejects_truncated_request_body_instead_of_panicking() {
        let mut buf = Vec::new();
        buf.put_u32(5);
        buf.put_u8(6);
        buf.put_u32(0);
        let mut cursor = std::io::Cursor::new(buf);
        let err = Message::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::MalformedMessage));
    }
}
