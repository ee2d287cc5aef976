//! Agent and customer client against a live broker on loopback.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use takeout_broker::config::{BrokerConfig, Config, DiscoveryConfig, RegistryConfig};
use takeout_broker::{Broker, BrokerEvent, RegistryStatus};
use takeout_client::{
    AgentConfig, ClientError, CustomerClient, MenuProvider, RestaurantAgent, SelectionProvider,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing_subscriber::EnvFilter;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed menu and estimate; records every selection ordered.
struct FixedMenu {
    menu: String,
    estimate: String,
    orders: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MenuProvider for FixedMenu {
    fn menu(&self) -> String {
        self.menu.clone()
    }

    async fn estimate(&mut self, selection: &str) -> Result<String, ClientError> {
        self.orders.lock().unwrap().push(selection.to_string());
        Ok(self.estimate.clone())
    }
}

/// Plays back restaurant choices in order, always orders the same meal.
struct Script {
    restaurants: VecDeque<&'static str>,
    meal: &'static str,
    unavailable: Arc<Mutex<Vec<String>>>,
}

impl Script {
    fn new(restaurants: &[&'static str], meal: &'static str) -> Self {
        Self {
            restaurants: restaurants.iter().copied().collect(),
            meal,
            unavailable: Arc::default(),
        }
    }
}

#[async_trait]
impl SelectionProvider for Script {
    async fn choose_restaurant(&mut self, options: &str) -> Result<String, ClientError> {
        assert!(options.starts_with("Choose a restaurant:"));
        self.restaurants
            .pop_front()
            .map(str::to_string)
            .ok_or(ClientError::NoSelection)
    }

    async fn choose_meal(&mut self, _menu: &str) -> Result<String, ClientError> {
        Ok(self.meal.to_string())
    }

    async fn unavailable(&mut self, notice: &str) {
        self.unavailable.lock().unwrap().push(notice.to_string());
    }
}

/// Holds its session open until released, then gives up.
struct Stalled(Option<oneshot::Receiver<()>>);

#[async_trait]
impl SelectionProvider for Stalled {
    async fn choose_restaurant(&mut self, _options: &str) -> Result<String, ClientError> {
        if let Some(release) = self.0.take() {
            let _ = release.await;
        }
        Err(ClientError::NoSelection)
    }

    async fn choose_meal(&mut self, _menu: &str) -> Result<String, ClientError> {
        Err(ClientError::NoSelection)
    }
}

struct TestBroker {
    config: Config,
    customer_addr: SocketAddr,
    status: watch::Receiver<RegistryStatus>,
    events: mpsc::Sender<BrokerEvent>,
    restaurant_addrs: Vec<SocketAddr>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

async fn start_broker(customer_capacity: usize) -> TestBroker {
    let mut config = Config {
        broker: BrokerConfig {
            bind: "127.0.0.1".to_string(),
            customer_port: 0,
            ..BrokerConfig::default()
        },
        registry: RegistryConfig {
            customer_capacity,
            ..RegistryConfig::default()
        },
        discovery: DiscoveryConfig {
            enabled: false,
            ..DiscoveryConfig::default()
        },
        ..Config::default()
    };
    for restaurant in &mut config.restaurants {
        restaurant.port = 0;
    }

    let broker = Broker::bind(config.clone()).await.unwrap();
    let restaurant_addrs = config
        .restaurant_names()
        .iter()
        .map(|name| broker.restaurant_addr(name).unwrap())
        .collect();
    let test = TestBroker {
        config,
        customer_addr: broker.customer_addr().unwrap(),
        status: broker.status_receiver(),
        events: broker.event_sender(),
        restaurant_addrs,
    };
    tokio::spawn(broker.run());
    test
}

async fn wait_for_status(
    rx: &mut watch::Receiver<RegistryStatus>,
    pred: impl Fn(&RegistryStatus) -> bool,
) -> Result<RegistryStatus, &'static str> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            {
                let status = *rx.borrow_and_update();
                if pred(&status) {
                    return Ok(status);
                }
            }
            if rx.changed().await.is_err() {
                return Err("watch closed");
            }
        }
    })
    .await
    .map_err(|_| "timeout")?
}

/// Start an agent for restaurant `index`; returns its shutdown trigger.
fn spawn_agent(
    broker: &TestBroker,
    index: usize,
    menu: FixedMenu,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<Result<(), ClientError>>) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let agent = RestaurantAgent::new(AgentConfig::new(broker.restaurant_addrs[index]), menu);
    let handle = tokio::spawn(agent.run(async {
        let _ = stop_rx.await;
    }));
    (stop_tx, handle)
}

#[tokio::test]
async fn customer_orders_through_agent() {
    init_tracing();
    let mut broker = start_broker(5).await;
    assert_eq!(broker.config.restaurants[0].name, "McDonalds");

    let orders: Arc<Mutex<Vec<String>>> = Arc::default();
    let (stop, agent) = spawn_agent(
        &broker,
        0,
        FixedMenu {
            menu: "1. Big Mac - $5.99\n2. Fries - $2.49\n".to_string(),
            estimate: "Your order will be ready in 15 minutes.".to_string(),
            orders: Arc::clone(&orders),
        },
    );
    wait_for_status(&mut broker.status, |s| s.active_restaurants == 1)
        .await
        .expect("agent should register");

    // Dominos is not running: the client retries with McDonalds
    let script = Script::new(&["2", "1"], "1");
    let unavailable = Arc::clone(&script.unavailable);
    let client = CustomerClient::new(broker.customer_addr, script);
    let receipt = tokio::time::timeout(TIMEOUT, client.order())
        .await
        .expect("order should complete")
        .unwrap();

    assert_eq!(receipt.estimate, "Your order will be ready in 15 minutes.");
    assert_eq!(receipt.meal, "1");
    assert!(receipt.menu.contains("Big Mac"));
    assert_eq!(*orders.lock().unwrap(), vec!["1".to_string()]);
    assert_eq!(unavailable.lock().unwrap().len(), 1);
    assert!(unavailable.lock().unwrap()[0].contains("Dominos"));

    wait_for_status(&mut broker.status, |s| s.customers == 0)
        .await
        .expect("customer should leave");

    // Agent sends Leave on shutdown
    stop.send(()).unwrap();
    tokio::time::timeout(TIMEOUT, agent)
        .await
        .expect("agent should stop")
        .unwrap()
        .unwrap();
    wait_for_status(&mut broker.status, |s| s.restaurants == 0)
        .await
        .expect("restaurant should be removed");

    let _ = broker.events.send(BrokerEvent::Shutdown).await;
}

#[tokio::test]
async fn concurrent_customers_get_their_own_estimates() {
    init_tracing();
    let mut broker = start_broker(5).await;

    let orders = Arc::new(Mutex::new(Vec::new()));
    let (_stop, _agent) = spawn_agent(
        &broker,
        2,
        FixedMenu {
            menu: "1. Crunchwrap Supreme - $4.99\n".to_string(),
            estimate: "20".to_string(),
            orders: Arc::clone(&orders),
        },
    );
    wait_for_status(&mut broker.status, |s| s.active_restaurants == 1)
        .await
        .expect("agent should register");

    let first = CustomerClient::new(broker.customer_addr, Script::new(&["3"], "taco")).order();
    let second = CustomerClient::new(broker.customer_addr, Script::new(&["3"], "burrito")).order();
    let (first, second) = tokio::time::timeout(TIMEOUT, async { tokio::join!(first, second) })
        .await
        .expect("orders should complete");

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.meal, "taco");
    assert_eq!(second.meal, "burrito");
    assert_eq!(first.estimate, "20");
    assert_eq!(second.estimate, "20");

    let mut served = orders.lock().unwrap().clone();
    served.sort();
    assert_eq!(served, vec!["burrito".to_string(), "taco".to_string()]);

    let _ = broker.events.send(BrokerEvent::Shutdown).await;
}

#[tokio::test]
async fn full_broker_rejects_client() {
    init_tracing();
    let mut broker = start_broker(1).await;

    // Hold the only slot with a client that waits before choosing
    let (release, stalled) = oneshot::channel();
    let blocker = tokio::spawn(
        CustomerClient::new(broker.customer_addr, Stalled(Some(stalled)))
            .with_keep_alive(Duration::from_millis(200))
            .order(),
    );
    wait_for_status(&mut broker.status, |s| s.customers == 1)
        .await
        .expect("first customer should register");

    let result = tokio::time::timeout(
        TIMEOUT,
        CustomerClient::new(broker.customer_addr, Script::new(&["1"], "x")).order(),
    )
    .await
    .expect("rejection should be prompt");
    assert!(
        matches!(&result, Err(ClientError::Rejected(reason)) if reason == "server full"),
        "unexpected result {result:?}"
    );

    release.send(()).unwrap();
    let blocked = tokio::time::timeout(TIMEOUT, blocker).await.unwrap().unwrap();
    assert!(matches!(blocked, Err(ClientError::NoSelection)));

    let _ = broker.events.send(BrokerEvent::Shutdown).await;
}
