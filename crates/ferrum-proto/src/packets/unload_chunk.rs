//! UnloadChunk (0x1D) — Server → Client.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadChunk {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl UnloadChunk {
    pub const ID: i32 = 0x1D;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i32(self.chunk_x);
        buf.write_i32(self.chunk_z);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            chunk_x: buf.read_i32()?,
            chunk_z: buf.read_i32()?,
        })
    }
}
