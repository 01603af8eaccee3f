//! PlayerPosition (0x14) — Client → Server.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

impl PlayerPosition {
    pub const ID: i32 = 0x14;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_f64(self.x);
        buf.write_f64(self.y);
        buf.write_f64(self.z);
        buf.write_bool(self.on_ground);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            x: buf.read_f64()?,
            y: buf.read_f64()?,
            z: buf.read_f64()?,
            on_ground: buf.read_bool()?,
        })
    }
}
