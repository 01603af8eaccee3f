//! ChunkData (0x24) — Server → Client.
//!
//! Carries a serialized chunk column. The payload bytes are produced by the
//! world crate's chunk serializer; this packet only frames them.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub data: Vec<u8>,
    pub block_entities: Vec<u64>,
}

impl ChunkData {
    pub const ID: i32 = 0x24;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i32(self.chunk_x);
        buf.write_i32(self.chunk_z);
        buf.write_varint(self.data.len() as i32);
        buf.write_bytes(&self.data);
        buf.write_varint(self.block_entities.len() as i32);
        for be in &self.block_entities {
            buf.write_u64(*be);
        }
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        let chunk_x = buf.read_i32()?;
        let chunk_z = buf.read_i32()?;
        let data_len = buf.read_varint()?;
        if data_len < 0 {
            return Err(ProtoError::InvalidData(format!(
                "negative chunk data length {data_len}"
            )));
        }
        let data = buf.read_bytes(data_len as usize)?.to_vec();
        let be_count = buf.read_varint()?;
        if be_count < 0 {
            return Err(ProtoError::InvalidData(format!(
                "negative block entity count {be_count}"
            )));
        }
        let mut block_entities = Vec::with_capacity(be_count as usize);
        for _ in 0..be_count {
            block_entities.push(buf.read_u64()?);
        }
        Ok(Self {
            chunk_x,
            chunk_z,
            data,
            block_entities,
        })
    }
}
