//! LoginSuccess (0x02) — Server → Client.
//!
//! Completes LOGIN; the connection enters PLAY immediately after. The
//! trailing VarInt is the (always empty) property count.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;
use crate::types::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
}

impl LoginSuccess {
    pub const ID: i32 = 0x02;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        self.uuid.encode(buf);
        buf.write_string(&self.username);
        buf.write_varint(0);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        let uuid = Uuid::decode(buf)?;
        let username = buf.read_string()?;
        buf.read_varint()?;
        Ok(Self { uuid, username })
    }
}
