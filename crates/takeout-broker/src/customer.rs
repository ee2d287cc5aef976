//! Customer-side protocol dispatcher.

use std::sync::Arc;

use takeout_protocol::{MessageReceiver, MessageSender, PeerConnection};
use takeout_types::{Correlated, Message, MessageKind, Token};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::registry::{ConnectionId, CustomerSignal, Registry, RestaurantRef, SlotGuard};
use crate::state::OrderState;

/// Relays and expiry notices queued for one customer.
const SIGNAL_CAPACITY: usize = 8;

/// Known restaurant identities and the options text offered to customers.
pub(crate) struct RestaurantDirectory {
    names: Vec<String>,
    options: Message,
}

impl RestaurantDirectory {
    pub(crate) fn new(names: Vec<String>) -> Result<Self, BrokerError> {
        let mut text = String::from("Choose a restaurant:\n");
        for (i, name) in names.iter().enumerate() {
            text.push_str(&format!("{}. {name}\n", i + 1));
        }
        let options = Message::new(MessageKind::RestaurantOptions, text)
            .map_err(|e| BrokerError::Config(format!("restaurant list too long: {e}")))?;
        Ok(Self { names, options })
    }

    /// Resolve a 1-based choice to a restaurant name.
    fn resolve(&self, choice: &str) -> Result<&str, BrokerError> {
        choice
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
            .ok_or_else(|| BrokerError::InvalidRestaurantChoice(choice.to_string()))
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Serve one customer connection until it closes, violates the protocol or
/// expires.
pub(crate) async fn serve_customer(
    conn: PeerConnection,
    registry: Arc<Registry>,
    directory: Arc<RestaurantDirectory>,
) {
    let remote = conn.remote_address();
    let connection = ConnectionId::next();
    let (mut tx, rx) = conn.into_split();
    let (signal_tx, signals) = mpsc::channel(SIGNAL_CAPACITY);

    let token = match registry.register_customer(connection, signal_tx) {
        Ok(token) => token,
        Err(e) => {
            warn!(remote = %remote, error = %e, "rejecting customer");
            let notice = Message::new(MessageKind::Error, "server full")
                .unwrap_or_else(|_| Message::bare(MessageKind::Error));
            let _ = tx.send(&notice).await;
            let _ = tx.finish().await;
            return;
        }
    };
    let _guard = SlotGuard::customer(registry.clone(), connection);
    debug!(remote = %remote, connection = %connection, "customer session started");

    let mut session = CustomerSession {
        connection,
        token,
        registry,
        directory,
        tx,
        state: OrderState::Init,
        chosen: None,
    };

    let result = session.run(rx, signals).await;
    let last_state = session.state;
    session.state = OrderState::Closed;
    match result {
        Ok(()) => info!(token = %token, state = %last_state, "customer left"),
        Err(e) if e.is_disconnect() => {
            info!(token = %token, state = %last_state, "customer disconnected");
        }
        Err(BrokerError::SessionExpired) => {
            info!(token = %token, state = %last_state, "customer session closed after timeout");
        }
        Err(e) => {
            warn!(token = %token, state = %last_state, error = %e, "closing customer connection");
        }
    }
    let _ = session.tx.finish().await;
}

struct CustomerSession {
    connection: ConnectionId,
    token: Token,
    registry: Arc<Registry>,
    directory: Arc<RestaurantDirectory>,
    tx: MessageSender,
    state: OrderState,
    chosen: Option<RestaurantRef>,
}

impl CustomerSession {
    async fn run(
        &mut self,
        mut rx: MessageReceiver,
        mut signals: mpsc::Receiver<CustomerSignal>,
    ) -> Result<(), BrokerError> {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let msg = msg?;
                    if !self.registry.touch_customer(self.connection) {
                        return Err(BrokerError::SessionExpired);
                    }
                    debug!(
                        token = %self.token,
                        state = %self.state,
                        kind = %msg.kind,
                        "customer message"
                    );
                    if let Flow::Stop = self.handle_message(&msg).await? {
                        return Ok(());
                    }
                }
                signal = signals.recv() => match signal {
                    Some(CustomerSignal::Relay(estimate)) => self.relay_estimate(estimate).await?,
                    Some(CustomerSignal::Expired) | None => return Err(BrokerError::SessionExpired),
                },
            }
        }
    }

    async fn handle_message(&mut self, msg: &Message) -> Result<Flow, BrokerError> {
        match (self.state, msg.kind) {
            (_, MessageKind::KeepAlive) => {}
            (_, MessageKind::Leave) => return Ok(Flow::Stop),
            (OrderState::Init, MessageKind::RequestMenu) => {
                self.tx.send(&self.directory.options).await?;
                self.transition(OrderState::OptionsSent, None)?;
            }
            (OrderState::OptionsSent, MessageKind::ChooseRestaurant | MessageKind::Order) => {
                self.choose_restaurant(msg.text()).await?;
            }
            (OrderState::MenuSent, MessageKind::Order) => {
                self.place_order(msg.text()).await?;
            }
            (state, kind) => return Err(BrokerError::ProtocolViolation { state, kind }),
        }
        Ok(Flow::Continue)
    }

    async fn choose_restaurant(&mut self, choice: &str) -> Result<(), BrokerError> {
        let name = self.directory.resolve(choice)?.to_string();
        match self.registry.find_active_restaurant(&name) {
            Some(restaurant) => {
                self.tx
                    .send(&Message::new(MessageKind::Menu, restaurant.menu)?)
                    .await?;
                let chosen = RestaurantRef {
                    name,
                    connection: restaurant.connection,
                };
                self.transition(OrderState::MenuSent, Some(chosen))
            }
            None => {
                debug!(token = %self.token, restaurant = %name, "restaurant unavailable");
                self.send_unavailable(&name).await
            }
        }
    }

    async fn place_order(&mut self, selection: &str) -> Result<(), BrokerError> {
        let Some(chosen) = self.chosen.clone() else {
            return Err(BrokerError::ProtocolViolation {
                state: self.state,
                kind: MessageKind::Order,
            });
        };
        let order = Message {
            kind: MessageKind::Order,
            payload: Correlated::new(self.token, selection).to_payload()?,
        };

        let Some(outbox) = self.registry.restaurant_outbox(chosen.connection) else {
            return self.fall_back(&chosen.name).await;
        };

        // Waiting state must be visible before the restaurant can answer
        self.transition(OrderState::OrderPlaced, Some(chosen.clone()))?;
        match outbox.try_send(order) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(token = %self.token, restaurant = %chosen.name, "restaurant backlogged");
                return self.fall_back(&chosen.name).await;
            }
            Err(TrySendError::Closed(_)) => return self.fall_back(&chosen.name).await,
        }
        info!(token = %self.token, restaurant = %chosen.name, "order forwarded");
        Ok(())
    }

    async fn relay_estimate(&mut self, estimate: Message) -> Result<(), BrokerError> {
        if !self.state.awaits_estimate() {
            debug!(token = %self.token, state = %self.state, "dropping stale estimate");
            return Ok(());
        }
        self.tx.send(&estimate).await?;
        let chosen = self.chosen.take();
        self.transition(OrderState::Done, chosen)?;
        info!(token = %self.token, estimate = %estimate.text(), "estimate delivered");
        Ok(())
    }

    /// The chosen restaurant went away or stopped draining its orders.
    async fn fall_back(&mut self, name: &str) -> Result<(), BrokerError> {
        info!(token = %self.token, restaurant = %name, "chosen restaurant gone");
        self.transition(OrderState::OptionsSent, None)?;
        self.send_unavailable(name).await
    }

    async fn send_unavailable(&mut self, name: &str) -> Result<(), BrokerError> {
        let notice = Message::new(
            MessageKind::RestaurantUnavailable,
            format!("{name} is not available"),
        )?;
        self.tx.send(&notice).await?;
        Ok(())
    }

    fn transition(
        &mut self,
        state: OrderState,
        chosen: Option<RestaurantRef>,
    ) -> Result<(), BrokerError> {
        if !self
            .registry
            .update_customer(self.connection, state, chosen.clone())
        {
            return Err(BrokerError::SessionExpired);
        }
        debug!(token = %self.token, from = %self.state, to = %state, "customer state change");
        self.state = state;
        self.chosen = chosen;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use takeout_protocol::TcpTransport;

    use super::*;

    fn directory() -> RestaurantDirectory {
        RestaurantDirectory::new(vec![
            "McDonalds".to_string(),
            "Dominos".to_string(),
            "Taco Bell".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn options_text_lists_restaurants_in_order() {
        assert_eq!(
            directory().options.text(),
            "Choose a restaurant:\n1. McDonalds\n2. Dominos\n3. Taco Bell\n"
        );
    }

    #[test]
    fn choices_are_one_based() {
        let directory = directory();
        assert_eq!(directory.resolve("1").unwrap(), "McDonalds");
        assert_eq!(directory.resolve(" 3\n").unwrap(), "Taco Bell");
    }

    #[test]
    fn bad_choices_are_rejected() {
        let directory = directory();
        for choice in ["0", "4", "", "two", "-1"] {
            assert!(
                matches!(
                    directory.resolve(choice),
                    Err(BrokerError::InvalidRestaurantChoice(_))
                ),
                "{choice:?} should be rejected"
            );
        }
    }

    #[test]
    fn oversized_directory_is_a_config_error() {
        let names = (0..200).map(|i| format!("Restaurant number {i}")).collect();
        assert!(matches!(
            RestaurantDirectory::new(names),
            Err(BrokerError::Config(_))
        ));
    }

    /// A session in `MenuSent` for Dominos, plus the customer's end of the
    /// socket.
    async fn session_at_menu(
        registry: Arc<Registry>,
        restaurant: ConnectionId,
    ) -> (CustomerSession, MessageReceiver) {
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = TcpTransport::bind(bind).await.unwrap();
        let addr = transport.local_addr().unwrap();
        let (accepted, connected) =
            tokio::join!(transport.accept(), TcpTransport::connect(addr));
        let (tx, _) = accepted.unwrap().into_split();
        let (_, customer_rx) = connected.unwrap().into_split();

        let connection = ConnectionId::next();
        let (signal_tx, _signals) = mpsc::channel(SIGNAL_CAPACITY);
        let token = registry.register_customer(connection, signal_tx).unwrap();
        let chosen = RestaurantRef {
            name: "Dominos".to_string(),
            connection: restaurant,
        };
        assert!(registry.update_customer(connection, OrderState::MenuSent, Some(chosen.clone())));

        let session = CustomerSession {
            connection,
            token,
            registry,
            directory: Arc::new(directory()),
            tx,
            state: OrderState::MenuSent,
            chosen: Some(chosen),
        };
        (session, customer_rx)
    }

    #[tokio::test]
    async fn backlogged_restaurant_does_not_block_order() {
        let registry = Arc::new(Registry::new(2, 1));
        let restaurant = ConnectionId::next();
        let (outbox, mut orders) = mpsc::channel(1);
        registry
            .register_or_update_restaurant(restaurant, "Dominos", "1. Pizza", &outbox)
            .unwrap();
        outbox
            .try_send(Message::bare(MessageKind::Order))
            .unwrap();

        let (mut session, mut customer_rx) = session_at_menu(registry.clone(), restaurant).await;
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            session.place_order("ORDER: 1"),
        )
        .await
        .expect("order should not wait on the outbox")
        .unwrap();

        assert_eq!(session.state, OrderState::OptionsSent);
        assert!(session.chosen.is_none());
        let notice = customer_rx.recv().await.unwrap();
        assert_eq!(notice.kind, MessageKind::RestaurantUnavailable);
        assert_eq!(notice.text(), "Dominos is not available");

        // Only the message queued before the order is in the outbox
        assert!(orders.try_recv().is_ok());
        assert!(orders.try_recv().is_err());
    }

    #[tokio::test]
    async fn order_is_queued_with_token() {
        let registry = Arc::new(Registry::new(2, 1));
        let restaurant = ConnectionId::next();
        let (outbox, mut orders) = mpsc::channel(1);
        registry
            .register_or_update_restaurant(restaurant, "Dominos", "1. Pizza", &outbox)
            .unwrap();

        let (mut session, _customer_rx) = session_at_menu(registry.clone(), restaurant).await;
        session.place_order("ORDER: 1").await.unwrap();

        assert_eq!(session.state, OrderState::OrderPlaced);
        let order = orders.try_recv().unwrap();
        assert_eq!(order.kind, MessageKind::Order);
        let correlated = Correlated::parse(&order.payload).unwrap();
        assert_eq!(correlated.token, session.token);
        assert_eq!(correlated.body, "ORDER: 1");
    }
}
