//! Protocol-level errors.

use thiserror::Error;

use crate::types::{Direction, Phase};

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("buffer underflow: need {needed} more bytes, have {remaining}")]
    Underflow { needed: usize, remaining: usize },

    #[error("overlong variable-length integer (more than {max_bytes} bytes)")]
    Overlong { max_bytes: usize },

    #[error("bad string length {0} (must be in [0, 32767])")]
    BadLength(i32),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("unknown packet id 0x{id:02X} for {phase:?}/{direction:?}")]
    UnknownPacket {
        phase: Phase,
        direction: Direction,
        id: i32,
    },

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    ProtocolVersionMismatch { expected: i32, got: i32 },

    #[error("frame of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: usize, max: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ProtoError {
    /// Whether the connection can survive this error by dropping the packet.
    ///
    /// Only unknown packet ids are recoverable; every other decode failure
    /// leaves the stream in an undefined state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtoError::UnknownPacket { .. })
    }
}
