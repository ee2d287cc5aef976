//! Shared types for takeout.
//!
//! This crate contains the types every takeout peer agrees on: the message
//! kind enumeration, the bounded text payload, the message envelope, and the
//! opaque session token used to correlate orders with customers.

pub mod error;
pub mod message;
pub mod token;

pub use error::TypesError;
pub use message::{Correlated, Message, MessageKind, Payload, MAX_PAYLOAD_LEN};
pub use token::Token;
