//! Error type shared by the framing, signal, envelope and discovery layers.

use thiserror::Error;

use crate::signal::SigType;

/// Errors raised by the crosspoint transport core.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload accessor was used on a sig of another type.
    #[error("sig type mismatch: expected {expected:?}, sig is {actual:?}")]
    SigTypeMismatch { expected: SigType, actual: SigType },

    /// The sig cannot be expressed in, or parsed from, the XSig encoding.
    #[error("XSig error: {0}")]
    XSig(String),

    /// The system id maps outside the UDP port range.
    #[error("invalid system id: {0}")]
    InvalidSystemId(i32),

    /// Every advertisement slot for the system id is already bound.
    #[error("no free advertisement slot for system {system_id}")]
    NoFreeSlot { system_id: i32 },

    /// A system with this id already exists in the registry.
    #[error("system {0} already exists")]
    SystemExists(i32),
}

pub type Result<T> = std::result::Result<T, Error>;
