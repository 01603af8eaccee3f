//! Handshake (0x00) — Client → Server.
//!
//! First packet on every connection; routes it to STATUS or LOGIN.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;
use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl Handshake {
    pub const ID: i32 = 0x00;

    /// Phase requested by `next_state` (1 = status, 2 = login).
    pub fn next_phase(&self) -> Option<Phase> {
        match self.next_state {
            1 => Some(Phase::Status),
            2 => Some(Phase::Login),
            _ => None,
        }
    }

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_varint(self.protocol_version);
        buf.write_string(&self.server_address);
        buf.write_u16(self.server_port);
        buf.write_varint(self.next_state);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            protocol_version: buf.read_varint()?,
            server_address: buf.read_string()?,
            server_port: buf.read_u16()?,
            next_state: buf.read_varint()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pkt = Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 1,
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        let decoded = Handshake::decode(&mut buf).unwrap();
        assert_eq!(decoded, pkt);
        assert_eq!(decoded.next_phase(), Some(Phase::Status));
    }

    #[test]
    fn next_phase_mapping() {
        let mut pkt = Handshake {
            protocol_version: 763,
            server_address: String::new(),
            server_port: 0,
            next_state: 2,
        };
        assert_eq!(pkt.next_phase(), Some(Phase::Login));
        pkt.next_state = 3;
        assert_eq!(pkt.next_phase(), None);
    }

    #[test]
    fn wire_layout() {
        // protocol 763, "localhost", port 25565, next=1 body is 15 bytes.
        let pkt = Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 1,
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        assert_eq!(
            buf.as_slice(),
            &[
                0xFB, 0x05, 0x09, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't', 0x63,
                0xDD, 0x01
            ]
        );
    }
}
