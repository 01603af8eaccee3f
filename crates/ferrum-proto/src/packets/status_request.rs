//! StatusRequest (0x00) — Client → Server. Empty body.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRequest;

impl StatusRequest {
    pub const ID: i32 = 0x00;

    pub fn encode(&self, _buf: &mut PacketBuffer) {}

    pub fn decode(_buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self)
    }
}
