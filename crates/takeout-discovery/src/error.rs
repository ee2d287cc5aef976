//! Discovery subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("multicast socket setup failed: {0}")]
    Socket(#[from] std::io::Error),

    #[error("announcement send failed: {0}")]
    Send(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
