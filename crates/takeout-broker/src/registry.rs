//! Fixed-capacity peer registry.
//!
//! Two slot arenas, one for customer sessions and one for restaurant
//! registrations, each behind its own mutex. Every operation is a short scan
//! or update; nothing here awaits or touches the network while a lock is
//! held. Callers address records by [`ConnectionId`] or [`Token`], never by
//! slot index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use takeout_types::{Message, Token};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::state::OrderState;

/// Identifies one accepted TCP connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{role} registry full ({capacity} slots)")]
    Full { role: &'static str, capacity: usize },
}

/// Signals delivered to a customer dispatcher from outside its connection.
#[derive(Debug)]
pub enum CustomerSignal {
    /// A correlated estimate to send to the customer.
    Relay(Message),
    /// The sweeper reclaimed the session.
    Expired,
}

/// Channel a restaurant dispatcher drains and writes to its socket.
pub type RestaurantOutbox = mpsc::Sender<Message>;

/// Non-owning reference from a customer session to the restaurant it chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantRef {
    pub name: String,
    pub connection: ConnectionId,
}

/// Snapshot of a customer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerView {
    pub connection: ConnectionId,
    pub token: Token,
    pub state: OrderState,
    pub chosen: Option<RestaurantRef>,
}

/// Snapshot of a restaurant registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantView {
    pub connection: ConnectionId,
    pub name: String,
    pub menu: String,
    pub active: bool,
}

/// Occupancy counters, published after every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    pub customers: usize,
    pub restaurants: usize,
    pub active_restaurants: usize,
}

/// A customer session reclaimed by [`Registry::expire_customers`].
#[derive(Debug)]
pub struct ExpiredSession {
    pub connection: ConnectionId,
    pub token: Token,
    pub signals: mpsc::Sender<CustomerSignal>,
}

struct CustomerSlot {
    connection: ConnectionId,
    token: Token,
    last_seen: Instant,
    state: OrderState,
    chosen: Option<RestaurantRef>,
    signals: mpsc::Sender<CustomerSignal>,
}

impl CustomerSlot {
    fn view(&self) -> CustomerView {
        CustomerView {
            connection: self.connection,
            token: self.token,
            state: self.state,
            chosen: self.chosen.clone(),
        }
    }
}

struct RestaurantSlot {
    connection: ConnectionId,
    name: String,
    menu: String,
    last_seen: Instant,
    active: bool,
    outbox: RestaurantOutbox,
}

impl RestaurantSlot {
    fn view(&self) -> RestaurantView {
        RestaurantView {
            connection: self.connection,
            name: self.name.clone(),
            menu: self.menu.clone(),
            active: self.active,
        }
    }
}

/// The broker's canonical record of connected peers.
pub struct Registry {
    customers: Mutex<Vec<Option<CustomerSlot>>>,
    restaurants: Mutex<Vec<Option<RestaurantSlot>>>,
    status: watch::Sender<RegistryStatus>,
}

impl Registry {
    pub fn new(customer_capacity: usize, restaurant_capacity: usize) -> Self {
        let (status, _) = watch::channel(RegistryStatus::default());
        Self {
            customers: Mutex::new(
                std::iter::repeat_with(|| None)
                    .take(customer_capacity)
                    .collect(),
            ),
            restaurants: Mutex::new(
                std::iter::repeat_with(|| None)
                    .take(restaurant_capacity)
                    .collect(),
            ),
            status,
        }
    }

    /// Watch occupancy changes.
    pub fn subscribe(&self) -> watch::Receiver<RegistryStatus> {
        self.status.subscribe()
    }

    // -----------------------------------------------------------------------
    // Customers
    // -----------------------------------------------------------------------

    /// Claim a free slot for a new customer connection and issue its token.
    pub fn register_customer(
        &self,
        connection: ConnectionId,
        signals: mpsc::Sender<CustomerSignal>,
    ) -> Result<Token, RegistryError> {
        let token = {
            let mut slots = lock(&self.customers);
            let capacity = slots.len();
            let free = slots
                .iter_mut()
                .find(|slot| slot.is_none())
                .ok_or(RegistryError::Full {
                    role: "customer",
                    capacity,
                })?;
            let token = Token::new();
            *free = Some(CustomerSlot {
                connection,
                token,
                last_seen: Instant::now(),
                state: OrderState::Init,
                chosen: None,
                signals,
            });
            self.publish_customers(&slots);
            token
        };
        info!(connection = %connection, token = %token, "customer registered");
        Ok(token)
    }

    /// Record liveness for a customer. Returns false if the slot is gone.
    pub fn touch_customer(&self, connection: ConnectionId) -> bool {
        let mut slots = lock(&self.customers);
        match find_customer(&mut slots, connection) {
            Some(slot) => {
                slot.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Publish the owning dispatcher's view of its session. Returns false if
    /// the slot is gone.
    pub fn update_customer(
        &self,
        connection: ConnectionId,
        state: OrderState,
        chosen: Option<RestaurantRef>,
    ) -> bool {
        let mut slots = lock(&self.customers);
        match find_customer(&mut slots, connection) {
            Some(slot) => {
                slot.state = state;
                slot.chosen = chosen;
                true
            }
            None => false,
        }
    }

    pub fn customer(&self, connection: ConnectionId) -> Option<CustomerView> {
        let mut slots = lock(&self.customers);
        find_customer(&mut slots, connection).map(|slot| slot.view())
    }

    /// Find the session holding `token` that is waiting for an estimate from
    /// the restaurant on `restaurant`, and return its signal channel.
    pub fn order_waiting(
        &self,
        token: Token,
        restaurant: ConnectionId,
    ) -> Option<mpsc::Sender<CustomerSignal>> {
        let slots = lock(&self.customers);
        slots
            .iter()
            .flatten()
            .find(|slot| {
                slot.token == token
                    && slot.state.awaits_estimate()
                    && slot
                        .chosen
                        .as_ref()
                        .is_some_and(|chosen| chosen.connection == restaurant)
            })
            .map(|slot| slot.signals.clone())
    }

    /// Clear a customer slot. Returns false if it was already free.
    pub fn remove_customer(&self, connection: ConnectionId) -> bool {
        let removed = {
            let mut slots = lock(&self.customers);
            let removed = slots
                .iter_mut()
                .find(|slot| matches!(slot, Some(s) if s.connection == connection))
                .and_then(Option::take);
            if removed.is_some() {
                self.publish_customers(&slots);
            }
            removed
        };
        match removed {
            Some(slot) => {
                debug!(connection = %connection, token = %slot.token, "customer slot released");
                true
            }
            None => false,
        }
    }

    /// Remove every session silent for longer than `timeout`.
    pub fn expire_customers(&self, now: Instant, timeout: Duration) -> Vec<ExpiredSession> {
        let mut slots = lock(&self.customers);
        let expired: Vec<ExpiredSession> = slots
            .iter_mut()
            .filter(|slot| {
                matches!(slot, Some(s) if now.saturating_duration_since(s.last_seen) > timeout)
            })
            .filter_map(Option::take)
            .map(|slot| ExpiredSession {
                connection: slot.connection,
                token: slot.token,
                signals: slot.signals,
            })
            .collect();
        if !expired.is_empty() {
            self.publish_customers(&slots);
        }
        expired
    }

    pub fn customer_count(&self) -> usize {
        lock(&self.customers).iter().flatten().count()
    }

    // -----------------------------------------------------------------------
    // Restaurants
    // -----------------------------------------------------------------------

    /// Record a menu from a restaurant connection.
    ///
    /// Updates the existing registration for `connection` in place, or
    /// claims a free slot for it.
    pub fn register_or_update_restaurant(
        &self,
        connection: ConnectionId,
        name: &str,
        menu: &str,
        outbox: &RestaurantOutbox,
    ) -> Result<(), RegistryError> {
        let now = Instant::now();
        let created = {
            let mut slots = lock(&self.restaurants);
            let created = if let Some(slot) = find_restaurant(&mut slots, connection) {
                slot.menu = menu.to_string();
                slot.last_seen = now;
                slot.active = true;
                false
            } else {
                let capacity = slots.len();
                let free = slots
                    .iter_mut()
                    .find(|slot| slot.is_none())
                    .ok_or(RegistryError::Full {
                        role: "restaurant",
                        capacity,
                    })?;
                *free = Some(RestaurantSlot {
                    connection,
                    name: name.to_string(),
                    menu: menu.to_string(),
                    last_seen: now,
                    active: true,
                    outbox: outbox.clone(),
                });
                true
            };
            self.publish_restaurants(&slots);
            created
        };
        if created {
            info!(connection = %connection, restaurant = name, "restaurant registered");
        } else {
            debug!(connection = %connection, restaurant = name, "restaurant menu updated");
        }
        Ok(())
    }

    /// Record liveness for a restaurant. Returns false if it has no slot.
    pub fn touch_restaurant(&self, connection: ConnectionId) -> bool {
        let mut slots = lock(&self.restaurants);
        match find_restaurant(&mut slots, connection) {
            Some(slot) => {
                slot.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// First registration with this name whose active flag is set.
    pub fn find_active_restaurant(&self, name: &str) -> Option<RestaurantView> {
        let slots = lock(&self.restaurants);
        slots
            .iter()
            .flatten()
            .find(|slot| slot.active && slot.name == name)
            .map(RestaurantSlot::view)
    }

    pub fn restaurant(&self, connection: ConnectionId) -> Option<RestaurantView> {
        let mut slots = lock(&self.restaurants);
        find_restaurant(&mut slots, connection).map(|slot| slot.view())
    }

    /// Channel for routing an order to the restaurant on `connection`.
    pub fn restaurant_outbox(&self, connection: ConnectionId) -> Option<RestaurantOutbox> {
        let mut slots = lock(&self.restaurants);
        find_restaurant(&mut slots, connection).map(|slot| slot.outbox.clone())
    }

    /// Clear a restaurant slot. Returns false if it was already free.
    pub fn remove_restaurant(&self, connection: ConnectionId) -> bool {
        let removed = {
            let mut slots = lock(&self.restaurants);
            let removed = slots
                .iter_mut()
                .find(|slot| matches!(slot, Some(s) if s.connection == connection))
                .and_then(Option::take);
            if removed.is_some() {
                self.publish_restaurants(&slots);
            }
            removed
        };
        match removed {
            Some(slot) => {
                info!(connection = %connection, restaurant = %slot.name, "restaurant removed");
                true
            }
            None => false,
        }
    }

    /// Clear the active flag of every restaurant silent for longer than
    /// `timeout`. The records stay so the next menu reactivates them.
    pub fn deactivate_restaurants(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut slots = lock(&self.restaurants);
        let deactivated: Vec<String> = slots
            .iter_mut()
            .flatten()
            .filter(|slot| slot.active && now.saturating_duration_since(slot.last_seen) > timeout)
            .map(|slot| {
                slot.active = false;
                slot.name.clone()
            })
            .collect();
        if !deactivated.is_empty() {
            self.publish_restaurants(&slots);
        }
        deactivated
    }

    pub fn restaurant_count(&self) -> usize {
        lock(&self.restaurants).iter().flatten().count()
    }

    pub fn active_restaurant_count(&self) -> usize {
        lock(&self.restaurants)
            .iter()
            .flatten()
            .filter(|slot| slot.active)
            .count()
    }

    /// Current occupancy. Takes each lock in turn, never both at once.
    pub fn status(&self) -> RegistryStatus {
        let customers = self.customer_count();
        let (restaurants, active_restaurants) = {
            let slots = lock(&self.restaurants);
            let present = slots.iter().flatten().count();
            let active = slots.iter().flatten().filter(|slot| slot.active).count();
            (present, active)
        };
        RegistryStatus {
            customers,
            restaurants,
            active_restaurants,
        }
    }

    // Called with the arena's lock held, so watch updates for one arena are
    // ordered the same way as the changes they describe.
    fn publish_customers(&self, slots: &[Option<CustomerSlot>]) {
        let customers = slots.iter().flatten().count();
        self.status.send_modify(|status| status.customers = customers);
    }

    fn publish_restaurants(&self, slots: &[Option<RestaurantSlot>]) {
        let restaurants = slots.iter().flatten().count();
        let active = slots.iter().flatten().filter(|slot| slot.active).count();
        self.status.send_modify(|status| {
            status.restaurants = restaurants;
            status.active_restaurants = active;
        });
    }
}

/// Releases a registry slot when the task owning the connection ends.
pub struct SlotGuard {
    registry: Arc<Registry>,
    connection: ConnectionId,
    kind: SlotKind,
}

enum SlotKind {
    Customer,
    Restaurant,
}

impl SlotGuard {
    pub fn customer(registry: Arc<Registry>, connection: ConnectionId) -> Self {
        Self {
            registry,
            connection,
            kind: SlotKind::Customer,
        }
    }

    pub fn restaurant(registry: Arc<Registry>, connection: ConnectionId) -> Self {
        Self {
            registry,
            connection,
            kind: SlotKind::Restaurant,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Already cleared by the sweeper or a Leave: nothing to do
        match self.kind {
            SlotKind::Customer => self.registry.remove_customer(self.connection),
            SlotKind::Restaurant => self.registry.remove_restaurant(self.connection),
        };
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_customer(
    slots: &mut [Option<CustomerSlot>],
    connection: ConnectionId,
) -> Option<&mut CustomerSlot> {
    slots
        .iter_mut()
        .flatten()
        .find(|slot| slot.connection == connection)
}

fn find_restaurant(
    slots: &mut [Option<RestaurantSlot>],
    connection: ConnectionId,
) -> Option<&mut RestaurantSlot> {
    slots
        .iter_mut()
        .flatten()
        .find(|slot| slot.connection == connection)
}
