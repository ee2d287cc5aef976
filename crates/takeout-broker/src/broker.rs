//! Core broker orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use takeout_discovery::{Announcer, MulticastBeacon};
use takeout_protocol::TcpTransport;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::customer::{serve_customer, RestaurantDirectory};
use crate::error::BrokerError;
use crate::registry::{Registry, RegistryStatus};
use crate::restaurant::serve_restaurant;
use crate::sweeper::{LivenessPolicy, Sweeper};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Events processed by the broker's main loop.
#[derive(Debug)]
pub enum BrokerEvent {
    /// Stop accepting, drop every connection and return from [`Broker::run`].
    Shutdown,
}

/// The takeout broker: listeners, registry, sweeper and announcer.
pub struct Broker {
    config: Config,
    registry: Arc<Registry>,
    directory: Arc<RestaurantDirectory>,
    customers: TcpTransport,
    restaurants: Vec<(String, TcpTransport)>,
    event_tx: mpsc::Sender<BrokerEvent>,
    event_rx: mpsc::Receiver<BrokerEvent>,
}

impl Broker {
    /// Validate `config` and bind every listening port.
    pub async fn bind(config: Config) -> Result<Self, BrokerError> {
        config.validate()?;
        if config.discovery.enabled {
            config.discovery.group_addr()?;
        }
        let directory = RestaurantDirectory::new(config.restaurant_names())?;

        let customers = TcpTransport::bind(config.customer_addr()?).await?;
        let mut restaurants = Vec::with_capacity(config.restaurants.len());
        for restaurant in &config.restaurants {
            let addr = config.broker.socket_addr(restaurant.port)?;
            let transport = TcpTransport::bind(addr).await?;
            restaurants.push((restaurant.name.clone(), transport));
        }

        let registry = Arc::new(Registry::new(
            config.registry.customer_capacity,
            config.registry.restaurant_capacity,
        ));
        let (event_tx, event_rx) = mpsc::channel(16);

        Ok(Self {
            config,
            registry,
            directory: Arc::new(directory),
            customers,
            restaurants,
            event_tx,
            event_rx,
        })
    }

    /// Get a clone of the event sender for controlling the broker.
    pub fn event_sender(&self) -> mpsc::Sender<BrokerEvent> {
        self.event_tx.clone()
    }

    /// Watch registry occupancy.
    pub fn status_receiver(&self) -> watch::Receiver<RegistryStatus> {
        self.registry.subscribe()
    }

    pub fn customer_addr(&self) -> Result<SocketAddr, BrokerError> {
        Ok(self.customers.local_addr()?)
    }

    /// Bound address of the listener for restaurant `name`.
    pub fn restaurant_addr(&self, name: &str) -> Option<SocketAddr> {
        self.restaurants
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, transport)| transport.local_addr().ok())
    }

    /// Run until a [`BrokerEvent::Shutdown`] arrives or every event sender
    /// is dropped.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        let mut tasks = JoinSet::new();

        let customer_addr = self.customers.local_addr()?;
        info!(addr = %customer_addr, "accepting customers");
        tasks.spawn(accept_customers(
            self.customers,
            self.registry.clone(),
            self.directory.clone(),
        ));

        for (name, transport) in self.restaurants {
            let addr = transport.local_addr()?;
            info!(addr = %addr, restaurant = %name, "accepting restaurant");
            tasks.spawn(accept_restaurants(transport, name, self.registry.clone()));
        }

        let policy = LivenessPolicy::from(&self.config.liveness);
        tasks.spawn(Sweeper::new(self.registry.clone(), policy).run());

        if self.config.discovery.enabled {
            let group = self.config.discovery.group_addr()?;
            match MulticastBeacon::bind(group) {
                Ok(beacon) => {
                    info!(group = %group, "announcing menu requests");
                    let announcer = Announcer::new(beacon, self.config.discovery.interval());
                    tasks.spawn(announcer.run());
                }
                Err(e) => warn!(group = %group, error = %e, "discovery disabled"),
            }
        }

        info!("broker running");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(BrokerEvent::Shutdown) | None => {
                        info!("shutting down");
                        break;
                    }
                },
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "broker task ended unexpectedly");
                    }
                }
            }
        }

        tasks.shutdown().await;
        info!("broker shut down complete");
        Ok(())
    }
}

async fn accept_customers(
    transport: TcpTransport,
    registry: Arc<Registry>,
    directory: Arc<RestaurantDirectory>,
) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            result = transport.accept() => match result {
                Ok(conn) => {
                    debug!(remote = %conn.remote_address(), "customer connection accepted");
                    sessions.spawn(serve_customer(conn, registry.clone(), directory.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "customer accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = sessions.join_next() => {}
        }
    }
}

async fn accept_restaurants(transport: TcpTransport, name: String, registry: Arc<Registry>) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            result = transport.accept() => match result {
                Ok(conn) => {
                    sessions.spawn(serve_restaurant(conn, name.clone(), registry.clone()));
                }
                Err(e) => {
                    warn!(restaurant = %name, error = %e, "restaurant accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = sessions.join_next() => {}
        }
    }
}
