use std::net::Ipv4Addr;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use cidr::Ipv4Inet;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::netlink::{error::NetlinkError, Netlink};

#[derive(Debug, Error)]
pub enum InspectionError {
    #[error(transparent)]
    Netlink(#[from] NetlinkError),
    #[error("interface {0} has no IPv4 address")]
    MissingAddress(String),
    #[error("can't determine WAN address from {0}")]
    MissingWanAddress(String),
}

/// Live configuration of a WireGuard interface.
#[derive(Clone, PartialEq, Eq)]
pub struct InterfaceState {
    pub listen_port: u16,
    pub private_key: String,
    pub public_key: String,
    pub vpn: Ipv4Inet,
}

impl std::fmt::Debug for InterfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceState")
            .field("listen_port", &self.listen_port)
            .field("public_key", &self.public_key)
            .field("vpn", &self.vpn)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait InterfaceInspector: Send + Sync {
    /// `Ok(None)` when the interface is absent or unconfigured.
    async fn inspect(&self, iface: &str) -> Result<Option<InterfaceState>, InspectionError>;

    /// Public address clients use to reach this host.
    async fn wan_address(&self) -> Result<Ipv4Addr, InspectionError>;

    /// A WireGuard interface present on this host, if any.
    async fn default_interface(&self) -> Result<Option<String>, InspectionError> {
        Ok(None)
    }
}

/// Reads interface state straight from the kernel.
#[derive(Debug, Clone)]
pub struct NetlinkInspector {
    wan_interface: String,
    wan_address: Option<Ipv4Addr>,
}

impl NetlinkInspector {
    pub fn new(wan_interface: String, wan_address: Option<Ipv4Addr>) -> Self {
        Self {
            wan_interface,
            wan_address,
        }
    }
}

#[async_trait]
impl InterfaceInspector for NetlinkInspector {
    #[instrument(skip(self))]
    async fn inspect(&self, iface: &str) -> Result<Option<InterfaceState>, InspectionError> {
        let mut netlink = Netlink::new()?;
        let device = match netlink.wg_interface(iface).await {
            Ok(device) => device,
            Err(e) if e.is_missing_device() => {
                debug!("interface {iface} does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if !device.is_configured() {
            debug!("interface {iface} has no private key");
            return Ok(None);
        }

        let vpn = netlink
            .ipv4_address(iface)?
            .ok_or_else(|| InspectionError::MissingAddress(iface.to_owned()))?;

        Ok(Some(InterfaceState {
            listen_port: device.listen_port,
            private_key: STANDARD.encode(device.private_key),
            public_key: STANDARD.encode(device.public_key),
            vpn,
        }))
    }

    #[instrument(skip(self))]
    async fn default_interface(&self) -> Result<Option<String>, InspectionError> {
        let netlink = Netlink::new()?;
        let links = netlink.wireguard_links()?;
        debug!(?links, "wireguard links");
        Ok(links.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn wan_address(&self) -> Result<Ipv4Addr, InspectionError> {
        if let Some(addr) = self.wan_address {
            return Ok(addr);
        }

        let netlink = Netlink::new()?;
        netlink
            .ipv4_address(&self.wan_interface)?
            .map(|inet| inet.address())
            .ok_or_else(|| InspectionError::MissingWanAddress(self.wan_interface.clone()))
    }
}
