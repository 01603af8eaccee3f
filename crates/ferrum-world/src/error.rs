//! World and persistence errors.

use thiserror::Error;

use ferrum_proto::error::ProtoError;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("region file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt chunk data: {0}")]
    Corrupt(#[from] ProtoError),

    #[error("chunk payload of {0} bytes exceeds a region sector run")]
    PayloadTooLarge(usize),
}
