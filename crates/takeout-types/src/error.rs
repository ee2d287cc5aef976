//! Errors raised while building or interpreting messages.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("payload contains a NUL byte")]
    PayloadContainsNul,

    #[error("invalid message kind {0}")]
    InvalidMessageKind(u32),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("malformed correlated payload: {0}")]
    MalformedCorrelation(String),
}
