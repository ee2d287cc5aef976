//! Customer client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use takeout_protocol::{MessageReceiver, MessageSender, TcpTransport};
use takeout_types::{Message, MessageKind};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::{SelectionProvider, DEFAULT_KEEP_ALIVE};

/// The outcome of a completed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Menu of the restaurant the order went to.
    pub menu: String,
    pub meal: String,
    pub estimate: String,
}

/// Walks one customer through the ordering protocol.
pub struct CustomerClient<S> {
    broker: SocketAddr,
    keep_alive: Duration,
    selector: S,
}

enum Choice {
    Menu(String),
    Unavailable,
}

impl<S: SelectionProvider> CustomerClient<S> {
    pub fn new(broker: SocketAddr, selector: S) -> Self {
        Self {
            broker,
            keep_alive: DEFAULT_KEEP_ALIVE,
            selector,
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = period.max(Duration::from_millis(1));
        self
    }

    /// Place one order and wait for its estimate, then leave.
    pub async fn order(mut self) -> Result<Receipt, ClientError> {
        let conn = TcpTransport::connect(self.broker).await?;
        let (tx, mut rx) = conn.into_split();
        let tx = Arc::new(Mutex::new(tx));
        let heartbeat = KeepAlive::spawn(tx.clone(), self.keep_alive);
        info!(broker = %self.broker, "connected to broker");

        // A full broker answers with Error and closes before reading
        let requested = send(&tx, Message::request_menu()).await;
        let options = expect_options(&mut rx).await?;
        requested?;

        let receipt = loop {
            let choice = self.selector.choose_restaurant(options.text()).await?;
            send(&tx, Message::new(MessageKind::ChooseRestaurant, choice)?).await?;
            let menu = match self.await_menu(&mut rx).await? {
                Choice::Menu(menu) => menu,
                Choice::Unavailable => continue,
            };

            let meal = self.selector.choose_meal(&menu).await?;
            send(&tx, Message::new(MessageKind::Order, meal.as_str())?).await?;
            let reply = rx.recv().await?;
            match reply.kind {
                MessageKind::EstimatedTime => {
                    break Receipt {
                        menu,
                        meal,
                        estimate: reply.text().to_string(),
                    };
                }
                // Restaurant left between menu and order; choose again
                MessageKind::RestaurantUnavailable => {
                    self.selector.unavailable(reply.text()).await;
                }
                kind => return Err(unexpected("EstimatedTime", kind, &reply)),
            }
        };
        info!(estimate = %receipt.estimate, "order confirmed");

        drop(heartbeat);
        let mut tx = tx.lock().await;
        tx.send(&Message::bare(MessageKind::Leave)).await?;
        Ok(receipt)
    }

    async fn await_menu(&mut self, rx: &mut MessageReceiver) -> Result<Choice, ClientError> {
        let reply = rx.recv().await?;
        match reply.kind {
            MessageKind::Menu => Ok(Choice::Menu(reply.text().to_string())),
            MessageKind::RestaurantUnavailable => {
                debug!(notice = %reply.text(), "restaurant unavailable");
                self.selector.unavailable(reply.text()).await;
                Ok(Choice::Unavailable)
            }
            kind => Err(unexpected("Menu", kind, &reply)),
        }
    }
}

/// Background `KeepAlive` sender, stopped on drop.
struct KeepAlive(JoinHandle<()>);

impl KeepAlive {
    fn spawn(tx: Arc<Mutex<MessageSender>>, period: Duration) -> Self {
        Self(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = tx.lock().await.send(&Message::keep_alive()).await {
                    warn!(error = %e, "keep-alive failed");
                    break;
                }
            }
        }))
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn send(tx: &Mutex<MessageSender>, msg: Message) -> Result<(), ClientError> {
    tx.lock().await.send(&msg).await?;
    Ok(())
}

async fn expect_options(rx: &mut MessageReceiver) -> Result<Message, ClientError> {
    let msg = rx.recv().await?;
    match msg.kind {
        MessageKind::RestaurantOptions => Ok(msg),
        kind => Err(unexpected("RestaurantOptions", kind, &msg)),
    }
}

fn unexpected(expected: &'static str, got: MessageKind, msg: &Message) -> ClientError {
    if got == MessageKind::Error {
        ClientError::Rejected(msg.text().to_string())
    } else {
        ClientError::UnexpectedMessage { expected, got }
    }
}
