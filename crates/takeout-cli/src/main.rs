//! takeout CLI: run the broker, a restaurant, or place an order.

mod menus;
mod terminal;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use takeout_broker::{setup, Broker, BrokerEvent, Config};
use takeout_client::{AgentConfig, CustomerClient, RestaurantAgent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::menus::{builtin_menu, KitchenMenu};
use crate::terminal::TerminalSelection;

#[derive(Parser)]
#[command(
    name = "takeout",
    about = "Rendezvous broker for takeout orders",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker.
    Broker,

    /// Run a restaurant that answers orders from the broker.
    Restaurant {
        /// Restaurant identity, as listed in the configuration.
        #[arg(short, long)]
        name: String,

        /// Broker host.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,

        /// Menu text file, for identities without a built-in menu.
        #[arg(long)]
        menu_file: Option<PathBuf>,

        /// Do not listen for multicast menu requests.
        #[arg(long)]
        no_discovery: bool,
    },

    /// Place an order interactively.
    Order {
        /// Broker host.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.broker.log_level)),
        )
        .init();

    match cli.command {
        Commands::Broker => run_broker(config).await,
        Commands::Restaurant {
            name,
            host,
            menu_file,
            no_discovery,
        } => run_restaurant(&config, &name, host, menu_file, no_discovery).await,
        Commands::Order { host } => run_order(&config, host).await,
    }
}

async fn run_broker(config: Config) -> anyhow::Result<()> {
    let broker = Broker::bind(config).await?;
    let events = broker.event_sender();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        let _ = events.send(BrokerEvent::Shutdown).await;
    });
    broker.run().await?;
    Ok(())
}

async fn run_restaurant(
    config: &Config,
    name: &str,
    host: IpAddr,
    menu_file: Option<PathBuf>,
    no_discovery: bool,
) -> anyhow::Result<()> {
    let identity = config
        .restaurants
        .iter()
        .find(|r| r.name == name)
        .with_context(|| {
            format!(
                "unknown restaurant {name:?}; configured: {}",
                config.restaurant_names().join(", ")
            )
        })?;

    let menu = match menu_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read menu {}", path.display()))?,
        None => builtin_menu(name)
            .with_context(|| format!("no built-in menu for {name:?}; pass --menu-file"))?
            .to_string(),
    };

    let mut agent_config = AgentConfig::new(SocketAddr::new(host, identity.port));
    if config.discovery.enabled && !no_discovery {
        agent_config.discovery = Some(config.discovery.group_addr()?);
    }

    info!(restaurant = %name, broker = %agent_config.broker, "starting restaurant");
    RestaurantAgent::new(agent_config, KitchenMenu::new(name, menu))
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn run_order(config: &Config, host: IpAddr) -> anyhow::Result<()> {
    let broker = SocketAddr::new(host, config.broker.customer_port);
    let receipt = CustomerClient::new(broker, TerminalSelection::new())
        .order()
        .await?;
    println!("Estimated time for your order: {}", receipt.estimate);
    Ok(())
}
