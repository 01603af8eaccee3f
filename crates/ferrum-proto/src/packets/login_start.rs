//! LoginStart (0x00) — Client → Server.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;
use crate::types::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
    pub uuid: Uuid,
}

impl LoginStart {
    pub const ID: i32 = 0x00;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_string(&self.username);
        self.uuid.encode(buf);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            username: buf.read_string()?,
            uuid: Uuid::decode(buf)?,
        })
    }
}
