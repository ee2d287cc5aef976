//! Periodic menu-request announcements.

use std::time::Duration;

use takeout_types::Message;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::DiscoveryError;
use crate::Beacon;

/// Announces `RequestMenu` on a fixed interval.
///
/// Holds no protocol state and never looks at the registry; restaurants
/// react to the announcement over their own TCP connection.
pub struct Announcer<B> {
    beacon: B,
    interval: Duration,
}

impl<B: Beacon> Announcer<B> {
    pub fn new(beacon: B, interval: Duration) -> Self {
        Self { beacon, interval }
    }

    /// Send a single announcement.
    pub async fn announce_once(&mut self) -> Result<(), DiscoveryError> {
        self.beacon.announce(&Message::request_menu()).await
    }

    /// Announce immediately, then once per interval.
    ///
    /// Runs forever; cancel by aborting the task. Send failures are logged
    /// and the next tick retries.
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "announcer starting");

        loop {
            ticker.tick().await;
            if let Err(e) = self.announce_once().await {
                warn!(error = %e, "menu request announcement failed");
            }
        }
    }
}
