//! Restaurant agent.

use std::future::Future;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use takeout_discovery::{AnnouncementListener, DiscoveryError};
use takeout_protocol::{MessageSender, TcpTransport};
use takeout_types::{Correlated, Message, MessageKind};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::{MenuProvider, DEFAULT_KEEP_ALIVE};

/// Where and how a restaurant agent talks to the broker.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The broker port assigned to this restaurant's identity.
    pub broker: SocketAddr,
    /// Multicast group to listen on for menu requests, if any.
    pub discovery: Option<SocketAddrV4>,
    pub keep_alive: Duration,
}

impl AgentConfig {
    pub fn new(broker: SocketAddr) -> Self {
        Self {
            broker,
            discovery: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

/// Keeps one restaurant registered with the broker and answers its orders.
pub struct RestaurantAgent<M> {
    config: AgentConfig,
    menu: M,
}

impl<M: MenuProvider> RestaurantAgent<M> {
    pub fn new(config: AgentConfig, menu: M) -> Self {
        Self { config, menu }
    }

    /// Serve orders until `shutdown` resolves, then send `Leave`.
    ///
    /// Returns an error if the broker closes the connection first.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ClientError> {
        let mut listener = self
            .config
            .discovery
            .map(AnnouncementListener::join)
            .transpose()?;

        let conn = TcpTransport::connect(self.config.broker).await?;
        let (mut tx, mut rx) = conn.into_split();
        info!(broker = %self.config.broker, "connected to broker");
        self.send_menu(&mut tx).await?;

        let period = self.config.keep_alive.max(Duration::from_millis(1));
        let mut keep_alive = interval_at(Instant::now() + period, period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("leaving broker");
                    tx.send(&Message::bare(MessageKind::Leave)).await?;
                    tx.finish().await?;
                    return Ok(());
                }
                _ = keep_alive.tick() => {
                    tx.send(&Message::keep_alive()).await?;
                }
                request = next_request(listener.as_mut()) => {
                    request?;
                    self.send_menu(&mut tx).await?;
                }
                msg = rx.recv() => {
                    let msg = msg?;
                    match msg.kind {
                        MessageKind::Order => self.answer_order(&mut tx, &msg).await?,
                        MessageKind::Error => {
                            warn!(error = %msg.text(), "broker reported an error");
                        }
                        kind => debug!(kind = %kind, "ignoring message"),
                    }
                }
            }
        }
    }

    async fn send_menu(&self, tx: &mut MessageSender) -> Result<(), ClientError> {
        tx.send(&Message::new(MessageKind::Menu, self.menu.menu())?)
            .await?;
        debug!("menu sent");
        Ok(())
    }

    async fn answer_order(
        &mut self,
        tx: &mut MessageSender,
        order: &Message,
    ) -> Result<(), ClientError> {
        let order = match Correlated::parse(&order.payload) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "ignoring malformed order");
                return Ok(());
            }
        };
        info!(token = %order.token, selection = %order.body, "order received");
        let estimate = self.menu.estimate(&order.body).await?;
        let reply = Message {
            kind: MessageKind::EstimatedTime,
            payload: Correlated::new(order.token, estimate).to_payload()?,
        };
        tx.send(&reply).await?;
        Ok(())
    }
}

async fn next_request(listener: Option<&mut AnnouncementListener>) -> Result<(), DiscoveryError> {
    match listener {
        Some(listener) => listener.next_request().await,
        None => std::future::pending().await,
    }
}
