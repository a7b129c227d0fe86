use std::io::{Read, Write};

use super::PeerError;

pub const PROTOCOL: [u8; 19] = *b"BitTorrent protocol";

pub struct Handshake {
    pub protocol: [u8; 19],
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {

    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            protocol: PROTOCOL,
            reserved: [0; 8],
            info_hash,
            peer_id,
        }
    }

    pub fn write_to(&self, w: &mut impl Write) -> std::io::Result<()> {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(&self.protocol);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        w.write_all(&buf)
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self, PeerError> {
        let mut buf = [0u8; 68];
        if let Err(e) = r.read_exact(&mut buf) {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(PeerError::NoHandshake);
            }
            return Err(e.into());
        }

        if buf[0] != 19 {
            return Err(PeerError::IncorrectProtocol);
        }

        let mut protocol = [0u8; 19];
        protocol.copy_from_slice(&buf[1..20]);
        if protocol != PROTOCOL {
            return Err(PeerError::IncorrectProtocol);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Self { protocol, reserved, info_hash, peer_id })
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("protocol", &String::from_utf8_lossy(&self.protocol))
            .field("info_hash", &hex::encode(self.info_hash))
            .field("peer_id", &String::from_utf8_lossy(&self.peer_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_buffer() {
        let hs = Handshake::new([1; 20], [2; 20]);
        let mut buf = Vec::new();
        hs.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 68);

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = Handshake::read_from(&mut cursor).unwrap();
        assert_eq!(decoded.info_hash, [1; 20]);
        assert_eq!(decoded.peer_id, [2; 20]);
        assert_eq!(decoded.reserved, [0; 8]);
    }

    #[test]
    fn rejects_wrong_pstrlen() {
        let mut buf = vec![20u8];
        buf.extend_from_slice(&[0u8; 67]);
        let mut cursor = std::io::Cursor::new(buf);
        let err = Handshake::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::IncorrectProtocol));
    }

    #[test]
    fn rejects_wrong_protocol_string() {
        let mut buf = vec![19u8];
        buf.extend_from_slice(b"Not BitTorrent prot");
        buf.extend_from_slice(&[0u8; 48]);
        let mut cursor = std::io::Cursor::new(buf);
        let err = Handshake::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PeerError::IncorrectProtocol));
    }
}
