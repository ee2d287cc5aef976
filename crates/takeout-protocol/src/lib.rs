//! TCP transport layer and wire protocol for takeout.
//!
//! This crate handles TCP connection management, the fixed-size record
//! codec, and framing of typed messages over a byte stream.

pub mod connection;
pub mod error;
pub mod transport;
pub mod wire;

pub use connection::{MessageReceiver, MessageSender, PeerConnection};
pub use error::ProtocolError;
pub use transport::TcpTransport;
