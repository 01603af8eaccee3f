//! JoinGame (0x26) — Server → Client.
//!
//! Initialises the client's world state on entering PLAY. The final byte is
//! the has-death-location flag, always zero here.

use crate::buffer::PacketBuffer;
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub hardcore: bool,
    pub gamemode: u8,
    pub previous_gamemode: u8,
    pub world_names: Vec<String>,
    pub dimension_type: String,
    pub dimension_name: String,
    pub hashed_seed: i64,
    pub max_players: i32,
    pub view_distance: i32,
    pub simulation_distance: i32,
    pub reduced_debug_info: bool,
    pub enable_respawn_screen: bool,
    pub is_debug: bool,
    pub is_flat: bool,
}

impl JoinGame {
    pub const ID: i32 = 0x26;

    pub fn encode(&self, buf: &mut PacketBuffer) {
        buf.write_i32(self.entity_id);
        buf.write_bool(self.hardcore);
        buf.write_u8(self.gamemode);
        buf.write_u8(self.previous_gamemode);
        buf.write_varint(self.world_names.len() as i32);
        for world in &self.world_names {
            buf.write_string(world);
        }
        buf.write_string(&self.dimension_type);
        buf.write_string(&self.dimension_name);
        buf.write_i64(self.hashed_seed);
        buf.write_varint(self.max_players);
        buf.write_varint(self.view_distance);
        buf.write_varint(self.simulation_distance);
        buf.write_bool(self.reduced_debug_info);
        buf.write_bool(self.enable_respawn_screen);
        buf.write_bool(self.is_debug);
        buf.write_bool(self.is_flat);
        buf.write_bool(false);
    }

    pub fn decode(buf: &mut PacketBuffer) -> Result<Self, ProtoError> {
        let entity_id = buf.read_i32()?;
        let hardcore = buf.read_bool()?;
        let gamemode = buf.read_u8()?;
        let previous_gamemode = buf.read_u8()?;
        let world_count = buf.read_varint()?;
        if world_count < 0 {
            return Err(ProtoError::InvalidData(format!(
                "negative world count {world_count}"
            )));
        }
        let mut world_names = Vec::with_capacity(world_count as usize);
        for _ in 0..world_count {
            world_names.push(buf.read_string()?);
        }
        let packet = Self {
            entity_id,
            hardcore,
            gamemode,
            previous_gamemode,
            world_names,
            dimension_type: buf.read_string()?,
            dimension_name: buf.read_string()?,
            hashed_seed: buf.read_i64()?,
            max_players: buf.read_varint()?,
            view_distance: buf.read_varint()?,
            simulation_distance: buf.read_varint()?,
            reduced_debug_info: buf.read_bool()?,
            enable_respawn_screen: buf.read_bool()?,
            is_debug: buf.read_bool()?,
            is_flat: buf.read_bool()?,
        };
        buf.read_bool()?;
        Ok(packet)
    }
}

impl Default for JoinGame {
    fn default() -> Self {
        Self {
            entity_id: 0,
            hardcore: false,
            gamemode: 0,
            previous_gamemode: 0,
            world_names: vec!["minecraft:overworld".into()],
            dimension_type: "minecraft:overworld".into(),
            dimension_name: "minecraft:overworld".into(),
            hashed_seed: 0,
            max_players: 20,
            view_distance: 10,
            simulation_distance: 10,
            reduced_debug_info: false,
            enable_respawn_screen: true,
            is_debug: false,
            is_flat: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pkt = JoinGame {
            entity_id: 7,
            gamemode: 1,
            hashed_seed: 12345,
            view_distance: 8,
            is_flat: true,
            ..JoinGame::default()
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        assert_eq!(JoinGame::decode(&mut buf).unwrap(), pkt);
        assert_eq!(buf.remaining(), 0, "decode must consume the trailing flag");
    }

    #[test]
    fn roundtrip_multiple_worlds() {
        let pkt = JoinGame {
            world_names: vec![
                "minecraft:overworld".into(),
                "minecraft:the_nether".into(),
                "minecraft:the_end".into(),
            ],
            ..JoinGame::default()
        };
        let mut buf = PacketBuffer::new();
        pkt.encode(&mut buf);
        assert_eq!(JoinGame::decode(&mut buf).unwrap().world_names.len(), 3);
    }
}
