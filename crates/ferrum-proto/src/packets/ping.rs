//! PingRequest (0x01, Client → Server) and PingResponse (0x01, Server → Client).
//!
//! The response echoes the request payload; the server closes afterwards.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: i64,
}

impl PingRequest {
    pub const ID: i32 = 0x01;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i64(self.payload);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            payload: buf.read_i64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResponse {
    pub payload: i64,
}

impl PingResponse {
    pub const ID: i32 = 0x01;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i64(self.payload);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            payload: buf.read_i64()?,
        })
    }
}
