//! PlayerPositionAndLook (0x3C) — Server → Client.
//!
//! Absolute teleport. `teleport_id` is echoed by the client's confirm; the
//! server does not currently wait for it.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionAndLook {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flags: u8,
    pub teleport_id: i32,
    pub dismount_vehicle: bool,
}

impl PlayerPositionAndLook {
    pub const ID: i32 = 0x3C;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_f64(self.x);
        buf.write_f64(self.y);
        buf.write_f64(self.z);
        buf.write_f32(self.yaw);
        buf.write_f32(self.pitch);
        buf.write_u8(self.flags);
        buf.write_varint(self.teleport_id);
        buf.write_bool(self.dismount_vehicle);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            x: buf.read_f64()?,
            y: buf.read_f64()?,
            z: buf.read_f64()?,
            yaw: buf.read_f32()?,
            pitch: buf.read_f32()?,
            flags: buf.read_u8()?,
            teleport_id: buf.read_varint()?,
            dismount_vehicle: buf.read_bool()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pkt = PlayerPositionAndLook {
            x: 0.5,
            y: 65.0,
            z: 0.5,
            yaw: 90.0,
            pitch: -10.0,
            flags: 0,
            teleport_id: 1,
            dismount_vehicle: false,
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        assert_eq!(PlayerPositionAndLook::decode(&mut buf).unwrap(), pkt);
    }
}
