//! KeepAlive — clientbound 0x21, serverbound 0x12.
//!
//! The server sends one every 20 seconds carrying a monotonic millisecond
//! timestamp; the client echoes it back.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientboundKeepAlive {
    pub id: i64,
}

impl ClientboundKeepAlive {
    pub const ID: i32 = 0x21;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i64(self.id);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            id: buf.read_i64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerboundKeepAlive {
    pub id: i64,
}

impl ServerboundKeepAlive {
    pub const ID: i32 = 0x12;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i64(self.id);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            id: buf.read_i64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = PacketBuffer::new();
        ClientboundKeepAlive { id: 123456789 }.encode(&mut buf);
        assert_eq!(ClientboundKeepAlive::decode(&mut buf).unwrap().id, 123456789);

        let mut buf = PacketBuffer::new();
        ServerboundKeepAlive { id: -1 }.encode(&mut buf);
        assert_eq!(ServerboundKeepAlive::decode(&mut buf).unwrap().id, -1);
    }
}
