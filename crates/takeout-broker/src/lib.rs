//! Core broker for takeout.
//!
//! Tracks connected customers and restaurants in a fixed-capacity registry,
//! runs the per-customer ordering state machine, routes orders to the chosen
//! restaurant connection and relays estimates back by token, and reclaims
//! slots from peers that go silent.

pub mod broker;
pub mod config;
mod customer;
pub mod error;
pub mod registry;
mod restaurant;
pub mod setup;
pub mod state;
pub mod sweeper;

pub use broker::{Broker, BrokerEvent};
pub use config::Config;
pub use error::BrokerError;
pub use registry::{ConnectionId, Registry, RegistryError, RegistryStatus};
pub use state::OrderState;
