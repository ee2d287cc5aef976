//! UDP multicast sockets for sending and receiving announcements.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use takeout_protocol::wire::{decode_message, encode_message, RECORD_LEN};
use takeout_types::{Message, MessageKind};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::error::DiscoveryError;
use crate::Beacon;

/// Sends announcements to an IPv4 multicast group.
pub struct MulticastBeacon {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl MulticastBeacon {
    /// Create a sending socket for `group`. Must be called inside a tokio
    /// runtime.
    pub fn bind(group: SocketAddrV4) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        // TTL 1: stay on the local link
        socket.set_multicast_ttl_v4(1)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        info!(group = %group, "multicast beacon ready");
        Ok(Self { socket, group })
    }
}

#[async_trait]
impl Beacon for MulticastBeacon {
    async fn announce(&mut self, msg: &Message) -> Result<(), DiscoveryError> {
        let record = encode_message(msg);
        let sent = self
            .socket
            .send_to(&record, SocketAddr::V4(self.group))
            .await
            .map_err(|e| DiscoveryError::Send(e.to_string()))?;
        trace!(bytes = sent, group = %self.group, "announcement sent");
        Ok(())
    }
}

/// Receives announcements on a multicast group (restaurant side).
pub struct AnnouncementListener {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl AnnouncementListener {
    /// Bind the group's port and join the group on the default interface.
    pub fn join(group: SocketAddrV4) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, group.port())).into())?;
        socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        info!(group = %group, "listening for menu requests");
        Ok(Self {
            socket,
            buf: vec![0u8; RECORD_LEN],
        })
    }

    /// Wait for the next `RequestMenu` announcement, skipping anything else.
    pub async fn next_request(&mut self) -> Result<(), DiscoveryError> {
        loop {
            let (n, from) = self.socket.recv_from(&mut self.buf).await?;
            if is_menu_request(&self.buf[..n]) {
                debug!(from = %from, "menu request received");
                return Ok(());
            }
            warn!(from = %from, bytes = n, "ignoring unexpected datagram");
        }
    }
}

/// Whether a datagram is a well-formed `RequestMenu` record.
pub fn is_menu_request(datagram: &[u8]) -> bool {
    matches!(decode_message(datagram), Ok(msg) if msg.kind == MessageKind::RequestMenu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_announcement_records() {
        let record = encode_message(&Message::request_menu());
        assert!(is_menu_request(&record));
    }

    #[test]
    fn rejects_other_kinds_and_garbage() {
        assert!(!is_menu_request(&encode_message(&Message::keep_alive())));
        assert!(!is_menu_request(b"REQUEST_MENU"));
        assert!(!is_menu_request(&[]));
    }
}
