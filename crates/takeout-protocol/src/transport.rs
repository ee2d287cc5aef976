//! TCP transport: bind, accept, and connect.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::connection::PeerConnection;
use crate::error::ProtocolError;

/// A listening TCP endpoint for one takeout port.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a listener on `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("bind {addr}: {e}")))?;
        info!(addr = %addr, "TCP transport bound");
        Ok(Self { listener })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<PeerConnection, ProtocolError> {
        let (stream, remote) = self.listener.accept().await?;
        debug!(remote = %remote, "accepted connection");
        PeerConnection::new(stream)
    }

    /// Connect to a remote takeout endpoint.
    pub async fn connect(addr: SocketAddr) -> Result<PeerConnection, ProtocolError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("connect {addr}: {e}")))?;
        debug!(remote = %addr, "connected to peer");
        PeerConnection::new(stream)
    }

    /// Get the local address this transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }
}
