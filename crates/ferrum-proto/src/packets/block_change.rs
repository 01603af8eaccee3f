//! BlockChange (0x0C) — Server → Client.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;
use crate::types::BlockPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChange {
    pub position: BlockPos,
    pub block_state: i32,
}

impl BlockChange {
    pub const ID: i32 = 0x0C;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_u64(self.position.pack());
        buf.write_varint(self.block_state);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            position: BlockPos::unpack(buf.read_u64()?),
            block_state: buf.read_varint()?,
        })
    }
}
