//! Periodic liveness sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::LivenessConfig;
use crate::registry::{CustomerSignal, Registry};

/// Timeouts applied on each sweep.
#[derive(Debug, Clone, Copy)]
pub struct LivenessPolicy {
    pub interval: Duration,
    pub session_timeout: Duration,
    pub restaurant_timeout: Duration,
}

impl From<&LivenessConfig> for LivenessPolicy {
    fn from(config: &LivenessConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            session_timeout: config.session_timeout(),
            restaurant_timeout: config.restaurant_timeout(),
        }
    }
}

/// What one sweep reclaimed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_customers: usize,
    pub deactivated_restaurants: Vec<String>,
}

pub struct Sweeper {
    registry: Arc<Registry>,
    policy: LivenessPolicy,
}

impl Sweeper {
    pub fn new(registry: Arc<Registry>, policy: LivenessPolicy) -> Self {
        Self { registry, policy }
    }

    /// Expire silent customers and deactivate silent restaurants as of `now`.
    pub fn sweep_once(&self, now: Instant) -> SweepReport {
        let expired = self
            .registry
            .expire_customers(now, self.policy.session_timeout);
        for session in &expired {
            info!(
                connection = %session.connection,
                token = %session.token,
                "customer session expired"
            );
            // Dispatcher already gone if the channel is closed or full of relays
            let _ = session.signals.try_send(CustomerSignal::Expired);
        }

        let deactivated = self
            .registry
            .deactivate_restaurants(now, self.policy.restaurant_timeout);
        for name in &deactivated {
            info!(restaurant = %name, "restaurant marked inactive");
        }

        SweepReport {
            expired_customers: expired.len(),
            deactivated_restaurants: deactivated,
        }
    }

    /// Sweep on every interval tick until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.sweep_once(Instant::now());
            debug!(
                expired = report.expired_customers,
                deactivated = report.deactivated_restaurants.len(),
                "liveness sweep"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use takeout_types::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::ConnectionId;

    fn policy() -> LivenessPolicy {
        LivenessPolicy::from(&LivenessConfig::default())
    }

    #[test]
    fn policy_follows_config() {
        let policy = policy();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.session_timeout, Duration::from_secs(15));
        assert_eq!(policy.restaurant_timeout, Duration::from_secs(180));
    }

    #[test]
    fn fresh_peers_survive_a_sweep() {
        let registry = Arc::new(Registry::new(2, 2));
        let (signals, _rx) = mpsc::channel(1);
        let (outbox, _orders) = mpsc::channel::<Message>(1);
        registry
            .register_customer(ConnectionId::next(), signals)
            .unwrap();
        registry
            .register_or_update_restaurant(ConnectionId::next(), "Dominos", "Pizza", &outbox)
            .unwrap();

        let report = Sweeper::new(registry.clone(), policy()).sweep_once(Instant::now());
        assert_eq!(report, SweepReport::default());
        assert_eq!(registry.customer_count(), 1);
        assert_eq!(registry.active_restaurant_count(), 1);
    }

    #[test]
    fn silent_customer_is_expired_and_signalled() {
        let registry = Arc::new(Registry::new(2, 2));
        let (signals, mut rx) = mpsc::channel(1);
        registry
            .register_customer(ConnectionId::next(), signals)
            .unwrap();

        let sweeper = Sweeper::new(registry.clone(), policy());
        let report = sweeper.sweep_once(Instant::now() + Duration::from_secs(16));

        assert_eq!(report.expired_customers, 1);
        assert_eq!(registry.customer_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(CustomerSignal::Expired)));
    }

    #[test]
    fn silent_restaurant_is_deactivated_not_removed() {
        let registry = Arc::new(Registry::new(2, 2));
        let (outbox, _orders) = mpsc::channel::<Message>(1);
        registry
            .register_or_update_restaurant(ConnectionId::next(), "McDonalds", "Fries", &outbox)
            .unwrap();

        let sweeper = Sweeper::new(registry.clone(), policy());

        // Past the session timeout but inside the restaurant window
        let report = sweeper.sweep_once(Instant::now() + Duration::from_secs(60));
        assert!(report.deactivated_restaurants.is_empty());

        let report = sweeper.sweep_once(Instant::now() + Duration::from_secs(181));
        assert_eq!(report.deactivated_restaurants, vec!["McDonalds".to_string()]);
        assert_eq!(registry.restaurant_count(), 1);
        assert_eq!(registry.active_restaurant_count(), 0);
    }

    #[test]
    fn closed_signal_channel_is_ignored() {
        let registry = Arc::new(Registry::new(1, 1));
        let (signals, rx) = mpsc::channel(1);
        registry
            .register_customer(ConnectionId::next(), signals)
            .unwrap();
        drop(rx);

        let report = Sweeper::new(registry.clone(), policy())
            .sweep_once(Instant::now() + Duration::from_secs(30));
        assert_eq!(report.expired_customers, 1);
    }
}
