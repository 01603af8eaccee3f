//! Minecraft Java Edition protocol types and packet definitions.
//!
//! Targets protocol 763 (release 1.20.1). Framing is
//! `VarInt(length) || VarInt(packet_id) || body` with all multi-byte body
//! integers big-endian; neither compression nor encryption is applied.

pub mod buffer;
pub mod error;
pub mod packets;
pub mod registry;
pub mod types;

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: i32 = 763;

/// Game version string reported in status responses.
pub const GAME_VERSION: &str = "1.20.1";
