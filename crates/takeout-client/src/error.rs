//! Client errors.

use takeout_types::MessageKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] takeout_protocol::ProtocolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] takeout_discovery::DiscoveryError),

    #[error("message error: {0}")]
    Message(#[from] takeout_types::TypesError),

    #[error("broker rejected the connection: {0}")]
    Rejected(String),

    #[error("expected {expected}, broker sent {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: MessageKind,
    },

    #[error("no selection made")]
    NoSelection,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
