//! Multicast discovery for takeout.
//!
//! The broker periodically announces `RequestMenu` on a multicast group so
//! that restaurants can (re)send their menus over their TCP connection. This
//! crate defines the [`Beacon`] trait used by the [`Announcer`], the UDP
//! multicast implementation of it, and the restaurant-side
//! [`AnnouncementListener`].

use async_trait::async_trait;
use takeout_types::Message;

pub mod announcer;
pub mod error;
pub mod multicast;

pub use announcer::Announcer;
pub use error::DiscoveryError;
pub use multicast::{is_menu_request, AnnouncementListener, MulticastBeacon};

/// A one-way channel that delivers announcements to listening restaurants.
#[async_trait]
pub trait Beacon: Send + 'static {
    /// Send one announcement. Never waits for a response.
    async fn announce(&mut self, msg: &Message) -> Result<(), DiscoveryError>;
}
