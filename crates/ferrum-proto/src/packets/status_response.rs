//! StatusResponse (0x00) — Server → Client.
//!
//! Carries the server-list JSON document.

use serde_json::json;

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;
use crate::{GAME_VERSION, PROTOCOL_VERSION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub const ID: i32 = 0x00;

    /// Build the response document via a JSON encoder so an MOTD containing
    /// quotes cannot break out of the string.
    pub fn build(motd: &str, max_players: u32, online: u32) -> Self {
        let json = json!({
            "version": { "name": GAME_VERSION, "protocol": PROTOCOL_VERSION },
            "players": { "max": max_players, "online": online },
            "description": { "text": motd },
            "favicon": "",
        });
        Self {
            json: json.to_string(),
        }
    }

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_string(&self.json);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        Ok(Self {
            json: buf.read_string()?,
        })
    }
}
