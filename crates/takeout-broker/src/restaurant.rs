//! Restaurant-side protocol dispatcher.
//!
//! The loop here is the only writer on a restaurant socket: orders routed by
//! customer dispatchers arrive through the outbox channel registered with the
//! restaurant's slot.

use std::sync::Arc;

use takeout_protocol::{MessageReceiver, MessageSender, PeerConnection};
use takeout_types::{Correlated, Message, MessageKind, Payload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::registry::{ConnectionId, CustomerSignal, Registry, RestaurantOutbox, SlotGuard};

/// Orders queued for one restaurant connection.
const OUTBOX_CAPACITY: usize = 32;

/// Serve one restaurant connection accepted on the port of `name`.
pub(crate) async fn serve_restaurant(conn: PeerConnection, name: String, registry: Arc<Registry>) {
    let remote = conn.remote_address();
    let connection = ConnectionId::next();
    let (tx, rx) = conn.into_split();
    let (outbox, orders) = mpsc::channel(OUTBOX_CAPACITY);
    let _guard = SlotGuard::restaurant(registry.clone(), connection);
    info!(remote = %remote, restaurant = %name, connection = %connection, "restaurant connected");

    let mut session = RestaurantSession {
        connection,
        name,
        registry,
        outbox,
        tx,
    };
    match session.run(rx, orders).await {
        Ok(()) => info!(restaurant = %session.name, "restaurant left"),
        Err(e) if e.is_disconnect() => info!(restaurant = %session.name, "restaurant disconnected"),
        Err(e) => warn!(restaurant = %session.name, error = %e, "closing restaurant connection"),
    }
    let _ = session.tx.finish().await;
}

struct RestaurantSession {
    connection: ConnectionId,
    name: String,
    registry: Arc<Registry>,
    outbox: RestaurantOutbox,
    tx: MessageSender,
}

impl RestaurantSession {
    async fn run(
        &mut self,
        mut rx: MessageReceiver,
        mut orders: mpsc::Receiver<Message>,
    ) -> Result<(), BrokerError> {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let msg = msg?;
                    self.registry.touch_restaurant(self.connection);
                    debug!(restaurant = %self.name, kind = %msg.kind, "restaurant message");
                    match msg.kind {
                        MessageKind::Menu => self.registry.register_or_update_restaurant(
                            self.connection,
                            &self.name,
                            msg.text(),
                            &self.outbox,
                        )?,
                        MessageKind::KeepAlive => {}
                        MessageKind::EstimatedTime => self.route_estimate(&msg.payload),
                        MessageKind::Leave => {
                            self.registry.remove_restaurant(self.connection);
                            return Ok(());
                        }
                        kind => return Err(BrokerError::UnexpectedRestaurantMessage(kind)),
                    }
                }
                Some(order) = orders.recv() => {
                    self.tx.send(&order).await?;
                }
            }
        }
    }

    /// Hand a `<token>:<estimate>` reply to the customer that placed the order.
    fn route_estimate(&self, payload: &Payload) {
        let estimate = match Correlated::parse(payload) {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!(restaurant = %self.name, error = %e, "dropping malformed estimate");
                return;
            }
        };
        let Some(signals) = self.registry.order_waiting(estimate.token, self.connection) else {
            warn!(
                restaurant = %self.name,
                token = %estimate.token,
                "no order waiting for estimate"
            );
            return;
        };
        let relay = match Message::new(MessageKind::EstimatedTime, estimate.body) {
            Ok(relay) => relay,
            Err(e) => {
                warn!(restaurant = %self.name, error = %e, "dropping estimate");
                return;
            }
        };
        if signals.try_send(CustomerSignal::Relay(relay)).is_err() {
            warn!(restaurant = %self.name, token = %estimate.token, "customer no longer reachable");
        }
    }
}
