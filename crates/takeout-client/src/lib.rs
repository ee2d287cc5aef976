//! Peers of the takeout broker.
//!
//! This crate defines the [`MenuProvider`] and [`SelectionProvider`] traits
//! that supply the human side of an order, the [`RestaurantAgent`] that keeps
//! a restaurant registered with the broker and answers its orders, and the
//! [`CustomerClient`] that walks one customer through the ordering protocol.

use std::time::Duration;

use async_trait::async_trait;

pub mod agent;
pub mod customer;
pub mod error;

pub use agent::{AgentConfig, RestaurantAgent};
pub use customer::{CustomerClient, Receipt};
pub use error::ClientError;

/// How often peers send `KeepAlive` when otherwise idle.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Supplies a restaurant's menu and its answers to orders.
#[async_trait]
pub trait MenuProvider: Send + 'static {
    /// Menu text sent to the broker on connect and on every menu request.
    fn menu(&self) -> String;

    /// Estimate for an order of `selection`, as sent back to the customer.
    async fn estimate(&mut self, selection: &str) -> Result<String, ClientError>;
}

/// Makes a customer's choices.
#[async_trait]
pub trait SelectionProvider: Send + 'static {
    /// Pick a restaurant from the broker's options text. The answer is sent
    /// verbatim as the choice (a 1-based index).
    async fn choose_restaurant(&mut self, options: &str) -> Result<String, ClientError>;

    /// Pick a meal from the chosen restaurant's menu.
    async fn choose_meal(&mut self, menu: &str) -> Result<String, ClientError>;

    /// The chosen restaurant cannot take orders right now.
    async fn unavailable(&mut self, _notice: &str) {}
}
