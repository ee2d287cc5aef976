//! Protocol and transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer shut the stream down on a record boundary.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The stream ended in the middle of a record.
    #[error("truncated record: got {got} of {expected} bytes")]
    Truncated { got: usize, expected: usize },

    #[error("invalid message kind {0}")]
    InvalidMessageKind(u32),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProtocolError {
    /// Whether the error reflects an orderly close by the peer.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}
