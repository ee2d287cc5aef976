//! Broker errors.

use takeout_types::MessageKind;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::state::OrderState;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] takeout_protocol::ProtocolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] takeout_discovery::DiscoveryError),

    #[error("message error: {0}")]
    Message(#[from] takeout_types::TypesError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("protocol violation: {kind} not allowed in state {state}")]
    ProtocolViolation { state: OrderState, kind: MessageKind },

    #[error("invalid restaurant choice {0:?}")]
    InvalidRestaurantChoice(String),

    #[error("unexpected {0} from restaurant")]
    UnexpectedRestaurantMessage(MessageKind),

    #[error("session expired")]
    SessionExpired,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrokerError {
    /// Whether the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_closed())
    }
}
