//! Broker configuration loaded from TOML.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Known restaurant identities, in the order customers choose them.
    #[serde(default = "default_restaurants")]
    pub restaurants: Vec<RestaurantConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            registry: RegistryConfig::default(),
            liveness: LivenessConfig::default(),
            discovery: DiscoveryConfig::default(),
            restaurants: default_restaurants(),
        }
    }
}

impl Config {
    /// Reject configurations the broker cannot run with.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.restaurants.is_empty() {
            return Err(BrokerError::Config(
                "at least one restaurant must be configured".to_string(),
            ));
        }
        if self.registry.customer_capacity == 0 || self.registry.restaurant_capacity == 0 {
            return Err(BrokerError::Config(
                "registry capacities must be non-zero".to_string(),
            ));
        }
        if self.liveness.sweep_interval_secs == 0 || self.discovery.interval_secs == 0 {
            return Err(BrokerError::Config(
                "sweep and announce intervals must be non-zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        if self.broker.customer_port != 0 {
            ports.insert(self.broker.customer_port);
        }
        for restaurant in &self.restaurants {
            if restaurant.name.is_empty() || restaurant.name.contains(['\n', '\0']) {
                return Err(BrokerError::Config(format!(
                    "invalid restaurant name {:?}",
                    restaurant.name
                )));
            }
            if !names.insert(restaurant.name.as_str()) {
                return Err(BrokerError::Config(format!(
                    "duplicate restaurant {}",
                    restaurant.name
                )));
            }
            // Port 0 asks the OS for an ephemeral port, so it may repeat
            if restaurant.port != 0 && !ports.insert(restaurant.port) {
                return Err(BrokerError::Config(format!(
                    "port {} is used twice",
                    restaurant.port
                )));
            }
        }
        Ok(())
    }

    /// Address of the customer-facing listener.
    pub fn customer_addr(&self) -> Result<SocketAddr, BrokerError> {
        self.broker.socket_addr(self.broker.customer_port)
    }

    /// Names of the known restaurants, in choice order.
    pub fn restaurant_names(&self) -> Vec<String> {
        self.restaurants.iter().map(|r| r.name.clone()).collect()
    }
}

/// Broker network and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_customer_port")]
    pub customer_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl BrokerConfig {
    pub fn socket_addr(&self, port: u16) -> Result<SocketAddr, BrokerError> {
        let ip = self
            .bind
            .parse()
            .map_err(|e| BrokerError::Config(format!("invalid bind address {}: {e}", self.bind)))?;
        Ok(SocketAddr::new(ip, port))
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            customer_port: default_customer_port(),
            log_level: default_log_level(),
        }
    }
}

/// Slot capacities of the peer registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_capacity")]
    pub customer_capacity: usize,
    #[serde(default = "default_capacity")]
    pub restaurant_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            customer_capacity: default_capacity(),
            restaurant_capacity: default_capacity(),
        }
    }
}

/// Liveness windows enforced by the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_restaurant_timeout")]
    pub restaurant_timeout_secs: u64,
}

impl LivenessConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn restaurant_timeout(&self) -> Duration {
        Duration::from_secs(self.restaurant_timeout_secs)
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            session_timeout_secs: default_session_timeout(),
            restaurant_timeout_secs: default_restaurant_timeout(),
        }
    }
}

/// Multicast menu-request announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,
    #[serde(default = "default_multicast_port")]
    pub port: u16,
    #[serde(default = "default_announce_interval")]
    pub interval_secs: u64,
}

impl DiscoveryConfig {
    pub fn group_addr(&self) -> Result<SocketAddrV4, BrokerError> {
        if !self.group.is_multicast() {
            return Err(BrokerError::Config(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        Ok(SocketAddrV4::new(self.group, self.port))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: default_group(),
            port: default_multicast_port(),
            interval_secs: default_announce_interval(),
        }
    }
}

/// A known restaurant identity and the port it connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantConfig {
    pub name: String,
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_customer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capacity() -> usize {
    5
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_session_timeout() -> u64 {
    15
}

fn default_restaurant_timeout() -> u64 {
    180
}

fn default_true() -> bool {
    true
}

fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 0, 0, 1)
}

fn default_multicast_port() -> u16 {
    5555
}

fn default_announce_interval() -> u64 {
    30
}

fn default_restaurants() -> Vec<RestaurantConfig> {
    vec![
        RestaurantConfig {
            name: "McDonalds".to_string(),
            port: 5556,
        },
        RestaurantConfig {
            name: "Dominos".to_string(),
            port: 5557,
        },
        RestaurantConfig {
            name: "Taco Bell".to_string(),
            port: 5558,
        },
    ]
}
