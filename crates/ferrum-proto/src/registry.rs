//! Typed packet sum and the (phase, direction, id) → decoder table.

use std::collections::HashMap;

use bytes::Bytes;

use crate::buffer::{varint_len, PacketBuffer};
use crate::error::ProtoError;
use crate::packets::*;
use crate::types::{Direction, Phase};

/// Every packet kind this server speaks.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Handshake(Handshake),
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    LoginStart(LoginStart),
    LoginSuccess(LoginSuccess),
    ClientboundKeepAlive(ClientboundKeepAlive),
    ServerboundKeepAlive(ServerboundKeepAlive),
    JoinGame(JoinGame),
    PlayerPosition(PlayerPosition),
    PlayerPositionAndLook(PlayerPositionAndLook),
    ChunkData(ChunkData),
    UnloadChunk(UnloadChunk),
    UpdateViewPosition(UpdateViewPosition),
    BlockChange(BlockChange),
    MultiBlockChange(MultiBlockChange),
}

macro_rules! per_packet {
    ($self:expr, $pkt:ident => $body:expr) => {
        match $self {
            Packet::Handshake($pkt) => $body,
            Packet::StatusRequest($pkt) => $body,
            Packet::StatusResponse($pkt) => $body,
            Packet::PingRequest($pkt) => $body,
            Packet::PingResponse($pkt) => $body,
            Packet::LoginStart($pkt) => $body,
            Packet::LoginSuccess($pkt) => $body,
            Packet::ClientboundKeepAlive($pkt) => $body,
            Packet::ServerboundKeepAlive($pkt) => $body,
            Packet::JoinGame($pkt) => $body,
            Packet::PlayerPosition($pkt) => $body,
            Packet::PlayerPositionAndLook($pkt) => $body,
            Packet::ChunkData($pkt) => $body,
            Packet::UnloadChunk($pkt) => $body,
            Packet::UpdateViewPosition($pkt) => $body,
            Packet::BlockChange($pkt) => $body,
            Packet::MultiBlockChange($pkt) => $body,
        }
    };
}

impl Packet {
    pub fn id(&self) -> i32 {
        match self {
            Packet::Handshake(_) => Handshake::ID,
            Packet::StatusRequest(_) => StatusRequest::ID,
            Packet::StatusResponse(_) => StatusResponse::ID,
            Packet::PingRequest(_) => PingRequest::ID,
            Packet::PingResponse(_) => PingResponse::ID,
            Packet::LoginStart(_) => LoginStart::ID,
            Packet::LoginSuccess(_) => LoginSuccess::ID,
            Packet::ClientboundKeepAlive(_) => ClientboundKeepAlive::ID,
            Packet::ServerboundKeepAlive(_) => ServerboundKeepAlive::ID,
            Packet::JoinGame(_) => JoinGame::ID,
            Packet::PlayerPosition(_) => PlayerPosition::ID,
            Packet::PlayerPositionAndLook(_) => PlayerPositionAndLook::ID,
            Packet::ChunkData(_) => ChunkData::ID,
            Packet::UnloadChunk(_) => UnloadChunk::ID,
            Packet::UpdateViewPosition(_) => UpdateViewPosition::ID,
            Packet::BlockChange(_) => BlockChange::ID,
            Packet::MultiBlockChange(_) => MultiBlockChange::ID,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Packet::Handshake(_) => Phase::Handshaking,
            Packet::StatusRequest(_)
            | Packet::StatusResponse(_)
            | Packet::PingRequest(_)
            | Packet::PingResponse(_) => Phase::Status,
            Packet::LoginStart(_) | Packet::LoginSuccess(_) => Phase::Login,
            _ => Phase::Play,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Packet::Handshake(_)
            | Packet::StatusRequest(_)
            | Packet::PingRequest(_)
            | Packet::LoginStart(_)
            | Packet::ServerboundKeepAlive(_)
            | Packet::PlayerPosition(_) => Direction::Serverbound,
            _ => Direction::Clientbound,
        }
    }

    /// Encode the body only (no id, no frame length).
    pub fn encode(&self, buf: &mut PacketBuffer) {
        per_packet!(self, pkt => pkt.encode(buf))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Handshake(_) => "Handshake",
            Packet::StatusRequest(_) => "StatusRequest",
            Packet::StatusResponse(_) => "StatusResponse",
            Packet::PingRequest(_) => "PingRequest",
            Packet::PingResponse(_) => "PingResponse",
            Packet::LoginStart(_) => "LoginStart",
            Packet::LoginSuccess(_) => "LoginSuccess",
            Packet::ClientboundKeepAlive(_) => "KeepAlive",
            Packet::ServerboundKeepAlive(_) => "KeepAlive",
            Packet::JoinGame(_) => "JoinGame",
            Packet::PlayerPosition(_) => "PlayerPosition",
            Packet::PlayerPositionAndLook(_) => "PlayerPositionAndLook",
            Packet::ChunkData(_) => "ChunkData",
            Packet::UnloadChunk(_) => "UnloadChunk",
            Packet::UpdateViewPosition(_) => "UpdateViewPosition",
            Packet::BlockChange(_) => "BlockChange",
            Packet::MultiBlockChange(_) => "MultiBlockChange",
        }
    }
}

/// Assemble the on-wire frame: `VarInt(id_size + body_size) || VarInt(id) || body`.
pub fn encode_frame(packet: &Packet) -> Bytes {
    let mut body = PacketBuffer::new();
    packet.encode(&mut body);

    let id = packet.id();
    let inner_len = varint_len(id) + body.len();
    let mut frame = PacketBuffer::with_capacity(varint_len(inner_len as i32) + inner_len);
    frame.write_varint(inner_len as i32);
    frame.write_varint(id);
    frame.write_bytes(body.as_slice());
    frame.into_bytes()
}

type DecodeFn = fn(&mut PacketBuffer) -> Result<Packet, ProtoError>;

/// Three-level lookup `(phase, direction, id) → decoder`, populated once at
/// startup. Lookup is a pure read.
pub struct PacketRegistry {
    decoders: HashMap<(Phase, Direction, i32), DecodeFn>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };

        use Direction::{Clientbound, Serverbound};
        use Phase::{Handshaking, Login, Play, Status};

        registry.register(Handshaking, Serverbound, Handshake::ID, |buf| {
            Ok(Packet::Handshake(Handshake::decode(buf)?))
        });
        registry.register(Status, Serverbound, StatusRequest::ID, |buf| {
            Ok(Packet::StatusRequest(StatusRequest::decode(buf)?))
        });
        registry.register(Status, Clientbound, StatusResponse::ID, |buf| {
            Ok(Packet::StatusResponse(StatusResponse::decode(buf)?))
        });
        registry.register(Status, Serverbound, PingRequest::ID, |buf| {
            Ok(Packet::PingRequest(PingRequest::decode(buf)?))
        });
        registry.register(Status, Clientbound, PingResponse::ID, |buf| {
            Ok(Packet::PingResponse(PingResponse::decode(buf)?))
        });
        registry.register(Login, Serverbound, LoginStart::ID, |buf| {
            Ok(Packet::LoginStart(LoginStart::decode(buf)?))
        });
        registry.register(Login, Clientbound, LoginSuccess::ID, |buf| {
            Ok(Packet::LoginSuccess(LoginSuccess::decode(buf)?))
        });
        registry.register(Play, Clientbound, ClientboundKeepAlive::ID, |buf| {
            Ok(Packet::ClientboundKeepAlive(ClientboundKeepAlive::decode(buf)?))
        });
        registry.register(Play, Serverbound, ServerboundKeepAlive::ID, |buf| {
            Ok(Packet::ServerboundKeepAlive(ServerboundKeepAlive::decode(buf)?))
        });
        registry.register(Play, Clientbound, JoinGame::ID, |buf| {
            Ok(Packet::JoinGame(JoinGame::decode(buf)?))
        });
        registry.register(Play, Serverbound, PlayerPosition::ID, |buf| {
            Ok(Packet::PlayerPosition(PlayerPosition::decode(buf)?))
        });
        registry.register(Play, Clientbound, PlayerPositionAndLook::ID, |buf| {
            Ok(Packet::PlayerPositionAndLook(PlayerPositionAndLook::decode(buf)?))
        });
        registry.register(Play, Clientbound, ChunkData::ID, |buf| {
            Ok(Packet::ChunkData(ChunkData::decode(buf)?))
        });
        registry.register(Play, Clientbound, UnloadChunk::ID, |buf| {
            Ok(Packet::UnloadChunk(UnloadChunk::decode(buf)?))
        });
        registry.register(Play, Clientbound, UpdateViewPosition::ID, |buf| {
            Ok(Packet::UpdateViewPosition(UpdateViewPosition::decode(buf)?))
        });
        registry.register(Play, Clientbound, BlockChange::ID, |buf| {
            Ok(Packet::BlockChange(BlockChange::decode(buf)?))
        });
        registry.register(Play, Clientbound, MultiBlockChange::ID, |buf| {
            Ok(Packet::MultiBlockChange(MultiBlockChange::decode(buf)?))
        });

        registry
    }

    fn register(&mut self, phase: Phase, direction: Direction, id: i32, decoder: DecodeFn) {
        let previous = self.decoders.insert((phase, direction, id), decoder);
        debug_assert!(
            previous.is_none(),
            "duplicate packet registration {phase:?}/{direction:?}/0x{id:02X}"
        );
    }

    /// Decode one packet body against the table active for `(phase, direction)`.
    pub fn decode(
        &self,
        phase: Phase,
        direction: Direction,
        id: i32,
        buf: &mut PacketBuffer,
    ) -> Result<Packet, ProtoError> {
        let decoder = self
            .decoders
            .get(&(phase, direction, id))
            .ok_or(ProtoError::UnknownPacket {
                phase,
                direction,
                id,
            })?;
        decoder(buf)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockPos, ChunkPos, Uuid};

    fn roundtrip(packet: Packet) {
        let registry = PacketRegistry::new();
        let mut body = PacketBuffer::new();
        packet.encode(&mut body);
        let decoded = registry
            .decode(packet.phase(), packet.direction(), packet.id(), &mut body)
            .unwrap_or_else(|e| panic!("decode failed for {}: {e}", packet.name()));
        assert_eq!(decoded, packet);
        assert_eq!(body.remaining(), 0, "{} left trailing bytes", packet.name());
    }

    #[test]
    fn every_packet_roundtrips_through_the_registry() {
        let mut mbc = MultiBlockChange::new(ChunkPos::new(2, -2));
        mbc.push(1, 2, 3, 4);

        let packets = vec![
            Packet::Handshake(Handshake {
                protocol_version: 763,
                server_address: "localhost".into(),
                server_port: 25565,
                next_state: 2,
            }),
            Packet::StatusRequest(StatusRequest),
            Packet::StatusResponse(StatusResponse::build("motd", 10, 1)),
            Packet::PingRequest(PingRequest { payload: 42 }),
            Packet::PingResponse(PingResponse { payload: 42 }),
            Packet::LoginStart(LoginStart {
                username: "Alex".into(),
                uuid: Uuid::offline("Alex"),
            }),
            Packet::LoginSuccess(LoginSuccess {
                uuid: Uuid::offline("Alex"),
                username: "Alex".into(),
            }),
            Packet::ClientboundKeepAlive(ClientboundKeepAlive { id: 1 }),
            Packet::ServerboundKeepAlive(ServerboundKeepAlive { id: 1 }),
            Packet::JoinGame(JoinGame::default()),
            Packet::PlayerPosition(PlayerPosition {
                x: 1.0,
                y: 65.0,
                z: -1.0,
                on_ground: true,
            }),
            Packet::PlayerPositionAndLook(PlayerPositionAndLook {
                x: 0.5,
                y: 65.0,
                z: 0.5,
                yaw: 0.0,
                pitch: 0.0,
                flags: 0,
                teleport_id: 1,
                dismount_vehicle: false,
            }),
            Packet::ChunkData(ChunkData {
                chunk_x: 0,
                chunk_z: 0,
                data: vec![0xAB; 32],
                block_entities: vec![],
            }),
            Packet::UnloadChunk(UnloadChunk {
                chunk_x: 3,
                chunk_z: -3,
            }),
            Packet::UpdateViewPosition(UpdateViewPosition {
                chunk_x: 0,
                chunk_z: 0,
            }),
            Packet::BlockChange(BlockChange {
                position: BlockPos::new(8, 64, 8),
                block_state: 1,
            }),
            Packet::MultiBlockChange(mbc),
        ];

        for packet in packets {
            roundtrip(packet);
        }
    }

    #[test]
    fn unknown_id_is_recoverable() {
        let registry = PacketRegistry::new();
        let mut buf = PacketBuffer::new();
        let err = registry
            .decode(Phase::Play, Direction::Serverbound, 0x7F, &mut buf)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn id_is_resolved_against_the_active_phase() {
        // 0x00 means Handshake in HANDSHAKING but StatusRequest in STATUS.
        let registry = PacketRegistry::new();
        let mut buf = PacketBuffer::new();
        let decoded = registry
            .decode(Phase::Status, Direction::Serverbound, 0x00, &mut buf)
            .unwrap();
        assert!(matches!(decoded, Packet::StatusRequest(_)));
    }

    #[test]
    fn registry_is_fully_populated() {
        assert_eq!(PacketRegistry::new().len(), 17);
    }

    #[test]
    fn frame_layout() {
        let frame = encode_frame(&Packet::PingResponse(PingResponse { payload: 42 }));
        // length 9 = VarInt id (1 byte) + i64 payload (8 bytes)
        assert_eq!(
            frame.as_ref(),
            &[0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]
        );
    }
}
