//! Packet definitions for protocol 763.
//!
//! One module per packet kind; each carries its numeric id and
//! `encode`/`decode` over [`PacketBuffer`](crate::buffer::PacketBuffer).

pub mod block_change;
pub mod chunk_data;
pub mod handshake;
pub mod join_game;
pub mod keep_alive;
pub mod login_start;
pub mod login_success;
pub mod multi_block_change;
pub mod ping;
pub mod player_position;
pub mod player_position_and_look;
pub mod status_request;
pub mod status_response;
pub mod unload_chunk;
pub mod update_view_position;

pub use block_change::BlockChange;
pub use chunk_data::ChunkData;
pub use handshake::Handshake;
pub use join_game::JoinGame;
pub use keep_alive::{ClientboundKeepAlive, ServerboundKeepAlive};
pub use login_start::LoginStart;
pub use login_success::LoginSuccess;
pub use multi_block_change::{BlockRecord, MultiBlockChange};
pub use ping::{PingRequest, PingResponse};
pub use player_position::PlayerPosition;
pub use player_position_and_look::PlayerPositionAndLook;
pub use status_request::StatusRequest;
pub use status_response::StatusResponse;
pub use unload_chunk::UnloadChunk;
pub use update_view_position::UpdateViewPosition;
