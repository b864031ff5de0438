use std::net::Ipv4Addr;

use cidr::{Ipv4Cidr, Ipv4Inet};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    inspector::{InspectionError, InterfaceInspector},
    keys::{KeyError, KeyProvider},
};

pub const DEFAULT_LISTEN_PORT: u16 = 52805;
pub const DEFAULT_VPN_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 200, 200, 1);
pub const DEFAULT_VPN_PREFIX: u8 = 22;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Inspection(#[from] InspectionError),
    #[error(transparent)]
    Keys(#[from] KeyError),
}

/// One VPN endpoint, identified by its interface name.
#[derive(Clone, PartialEq, Eq)]
pub struct Server {
    pub iface: String,
    pub public_key: String,
    pub private_key: String,
    pub wan_address: Ipv4Addr,
    /// Server address inside the VPN together with the subnet prefix.
    pub vpn: Ipv4Inet,
    pub listen_port: u16,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("iface", &self.iface)
            .field("public_key", &self.public_key)
            .field("wan_address", &self.wan_address)
            .field("vpn", &self.vpn)
            .field("listen_port", &self.listen_port)
            .finish_non_exhaustive()
    }
}

impl Server {
    pub const FIELDS: [&'static str; 7] = [
        "server_iface",
        "server_pub",
        "server_pri",
        "server_wan_ip",
        "server_vpn_ip",
        "server_vpn_subnet",
        "server_port",
    ];

    /// Reads the live interface, or falls back to a fresh default server when
    /// the interface is missing or unconfigured.
    #[instrument(skip(inspector, keys))]
    pub async fn from_interface(
        iface: &str,
        inspector: &dyn InterfaceInspector,
        keys: &dyn KeyProvider,
    ) -> Result<Self, ServerError> {
        let state = inspector.inspect(iface).await?;
        let wan_address = inspector.wan_address().await?;

        let server = match state {
            Some(state) => Self {
                iface: iface.to_owned(),
                public_key: state.public_key,
                private_key: state.private_key,
                wan_address,
                vpn: state.vpn,
                listen_port: state.listen_port,
            },
            None => {
                info!("interface {iface} not configured, using defaults");
                let pair = keys.keypair()?;
                Self {
                    iface: iface.to_owned(),
                    public_key: pair.public_key,
                    private_key: pair.private_key,
                    wan_address,
                    vpn: default_vpn(),
                    listen_port: DEFAULT_LISTEN_PORT,
                }
            }
        };

        Ok(server)
    }

    pub fn vpn_address(&self) -> Ipv4Addr {
        self.vpn.address()
    }

    pub fn subnet(&self) -> Ipv4Cidr {
        self.vpn.network()
    }

    /// Assignable host addresses in ascending order. Network and broadcast
    /// addresses are excluded unless the prefix is /31 or /32.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let subnet = self.subnet();
        let edges = if subnet.network_length() < 31 {
            Some((subnet.first_address(), subnet.last_address()))
        } else {
            None
        };

        subnet
            .iter()
            .addresses()
            .filter(move |a| edges.map_or(true, |(net, bcast)| *a != net && *a != bcast))
    }

    /// `addr` is a host of the subnet and not the server's own address.
    pub fn is_assignable(&self, addr: Ipv4Addr) -> bool {
        addr != self.vpn_address() && self.hosts().any(|h| h == addr)
    }

    pub fn fields(&self) -> [(&'static str, String); 7] {
        let [iface, public, private, wan, vpn_ip, vpn_subnet, port] = Self::FIELDS;
        [
            (iface, self.iface.clone()),
            (public, self.public_key.clone()),
            (private, self.private_key.clone()),
            (wan, self.wan_address.to_string()),
            (vpn_ip, self.vpn_address().to_string()),
            (vpn_subnet, self.vpn.network_length().to_string()),
            (port, self.listen_port.to_string()),
        ]
    }
}

fn default_vpn() -> Ipv4Inet {
    Ipv4Inet::new(DEFAULT_VPN_ADDRESS, DEFAULT_VPN_PREFIX)
        .unwrap_or_else(|_| unreachable!("/22 is a valid IPv4 prefix"))
}
