//! UpdateViewPosition (0x4E) — Server → Client.
//!
//! Recenters the client's chunk cache; sent before streaming a new window.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateViewPosition {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl UpdateViewPosition {
    pub const ID: i32 = 0x4E;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_varint(self.chunk_x);
        buf.write_varint(self.chunk_z);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            chunk_x: buf.read_varint()?,
            chunk_z: buf.read_varint()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pkt = UpdateViewPosition {
            chunk_x: 1,
            chunk_z: -1,
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        assert_eq!(UpdateViewPosition::decode(&mut buf).unwrap(), pkt);
    }
}
