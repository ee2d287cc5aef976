//! TCP connection and record framing.

use std::net::SocketAddr;

use takeout_types::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::ProtocolError;
use crate::wire::{decode_message, encode_message, RECORD_LEN};

/// A connection to a remote takeout peer.
pub struct PeerConnection {
    stream: TcpStream,
    remote: SocketAddr,
}

impl PeerConnection {
    pub fn new(stream: TcpStream) -> Result<Self, ProtocolError> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, remote })
    }

    /// Get the remote address of this connection.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Split into independently owned sending and receiving halves.
    pub fn into_split(self) -> (MessageSender, MessageReceiver) {
        let (read, write) = self.stream.into_split();
        (
            MessageSender::new(write, self.remote),
            MessageReceiver::new(read, self.remote),
        )
    }
}

/// Writes fixed-size records to the send half of a TCP stream.
pub struct MessageSender {
    stream: OwnedWriteHalf,
    remote: SocketAddr,
}

impl MessageSender {
    fn new(stream: OwnedWriteHalf, remote: SocketAddr) -> Self {
        Self { stream, remote }
    }

    /// Send one message as a complete record.
    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let record = encode_message(msg);
        self.stream.write_all(&record).await?;
        trace!(remote = %self.remote, kind = %msg.kind, "sent record");
        Ok(())
    }

    /// Shut down the write direction (signal no more data).
    pub async fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Reads fixed-size records from the receive half of a TCP stream.
pub struct MessageReceiver {
    stream: OwnedReadHalf,
    remote: SocketAddr,
    buf: Box<[u8]>,
    filled: usize,
}

impl MessageReceiver {
    fn new(stream: OwnedReadHalf, remote: SocketAddr) -> Self {
        Self {
            stream,
            remote,
            buf: vec![0u8; RECORD_LEN].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Receive and decode the next record.
    ///
    /// A stream that ends before any byte of a record yields
    /// [`ProtocolError::ConnectionClosed`]; one that ends mid-record yields
    /// [`ProtocolError::Truncated`]. Partial progress is kept in `self`, so
    /// this future is cancel safe and may be used in `tokio::select!`.
    pub async fn recv(&mut self) -> Result<Message, ProtocolError> {
        while self.filled < RECORD_LEN {
            let n = self.stream.read(&mut self.buf[self.filled..]).await?;
            if n == 0 {
                let got = std::mem::take(&mut self.filled);
                return Err(if got == 0 {
                    ProtocolError::ConnectionClosed
                } else {
                    ProtocolError::Truncated {
                        got,
                        expected: RECORD_LEN,
                    }
                });
            }
            self.filled += n;
        }

        self.filled = 0;
        let msg = decode_message(&self.buf)?;
        trace!(remote = %self.remote, kind = %msg.kind, "received record");
        Ok(msg)
    }
}
