use std::net::Ipv4Addr;

use clap::{Parser, Subcommand};
use tracing::warn;
use vpn_manager::{
    inspector::NetlinkInspector,
    keys::{KeyOverride, X25519KeyProvider},
    registry::Registry,
    render,
    service::{NewClient, Provisioner, ServiceError},
};

#[derive(Debug, Parser)]
struct Config {
    #[clap(long, short, env = "DB", value_parser, default_value = "sqlite://clients.db")]
    db: String,
    #[clap(long, env = "WAN_INTERFACE", value_parser, default_value = "eth0")]
    wan_interface: String,
    #[clap(long, env = "WAN_ADDRESS", value_parser)]
    wan_address: Option<Ipv4Addr>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new client and print its config
    Add {
        /// Defaults to the first WireGuard interface on this host
        #[clap(short, long, value_parser)]
        interface: Option<String>,
        #[clap(short, long, value_parser)]
        name: String,
        /// Defaults to the first free address
        #[clap(short, long, value_parser)]
        address: Option<Ipv4Addr>,
        #[clap(long, value_parser, requires = "public_key")]
        private_key: Option<String>,
        #[clap(long, value_parser, requires = "private_key")]
        public_key: Option<String>,
    },
    /// Print the address the next client would get
    Propose {
        /// Defaults to the first WireGuard interface on this host
        #[clap(short, long, value_parser)]
        interface: Option<String>,
    },
    /// List clients of an interface
    List {
        /// Defaults to the first WireGuard interface on this host
        #[clap(short, long, value_parser)]
        interface: Option<String>,
    },
    /// Print one client as JSON
    Show {
        #[clap(value_parser)]
        id: String,
    },
    ServerConfig {
        /// Defaults to the first WireGuard interface on this host
        #[clap(short, long, value_parser)]
        interface: Option<String>,
    },
    ClientConfig {
        #[clap(value_parser)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    pretty_env_logger::init();

    let config = Config::parse();

    let registry = Registry::open(&config.db)?;
    let inspector = NetlinkInspector::new(config.wan_interface, config.wan_address);
    let mut service = Provisioner::new(registry, Box::new(inspector), Box::new(X25519KeyProvider));

    let res = run(&mut service, config.command).await;
    if let Err(e) = service.close().await {
        warn!("closing client store failed: {e}");
    }
    res
}

async fn run(
    service: &mut Provisioner,
    command: Command,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match command {
        Command::Add {
            interface,
            name,
            address,
            private_key,
            public_key,
        } => {
            let interface = resolve(service, interface).await?;
            let server = service.server(&interface).await?;
            let client = service
                .new_client(
                    &server,
                    NewClient {
                        name,
                        address,
                        keys: KeyOverride {
                            private_key,
                            public_key,
                        },
                    },
                )
                .await?;
            print!("{}", render::client_config(&client, &server));
        }
        Command::Propose { interface } => {
            let interface = resolve(service, interface).await?;
            let server = service.server(&interface).await?;
            println!("{}", service.propose_address(&server).await?);
        }
        Command::List { interface } => {
            let interface = resolve(service, interface).await?;
            for client in service.registry().list_clients(&interface).await? {
                println!("{}\t{}\t{}", client.id, client.name, client.address);
            }
        }
        Command::Show { id } => {
            let client = service.registry().get_client(&id).await?;
            println!("{}", serde_json::to_string_pretty(&client)?);
        }
        Command::ServerConfig { interface } => {
            let interface = resolve(service, interface).await?;
            let server = service.server(&interface).await?;
            let clients = service.registry().list_clients(&interface).await?;
            print!("{}", render::server_config(&server, &clients));
        }
        Command::ClientConfig { id } => {
            let client = service.registry().get_client(&id).await?;
            let server = service.server(&client.server_iface).await?;
            print!("{}", render::client_config(&client, &server));
        }
    }

    Ok(())
}

async fn resolve(service: &Provisioner, interface: Option<String>) -> Result<String, ServiceError> {
    match interface {
        Some(interface) => Ok(interface),
        None => service.default_interface().await,
    }
}
