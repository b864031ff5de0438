#![allow(dead_code)]

use std::{
    net::Ipv4Addr,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use vpn_manager::{
    inspector::{InspectionError, InterfaceInspector, InterfaceState},
    keys::{KeyError, KeyProvider, Keypair},
    peer::Server,
    registry::Registry,
};

pub const WAN: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

/// Hands out `Pri0/Pub0`, `Pri1/Pub1`, ...
#[derive(Default)]
pub struct CountingKeys(AtomicUsize);

impl KeyProvider for CountingKeys {
    fn keypair(&self) -> Result<Keypair, KeyError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Keypair::new(format!("Pri{n}"), format!("Pub{n}"))
    }
}

/// Reports one configured interface; every other name is absent.
pub struct StaticInspector {
    pub iface: String,
    pub state: InterfaceState,
}

#[async_trait]
impl InterfaceInspector for StaticInspector {
    async fn inspect(&self, iface: &str) -> Result<Option<InterfaceState>, InspectionError> {
        Ok((iface == self.iface).then(|| self.state.clone()))
    }

    async fn wan_address(&self) -> Result<Ipv4Addr, InspectionError> {
        Ok(WAN)
    }

    async fn default_interface(&self) -> Result<Option<String>, InspectionError> {
        Ok(Some(self.iface.clone()))
    }
}

pub struct BrokenInspector;

#[async_trait]
impl InterfaceInspector for BrokenInspector {
    async fn inspect(&self, iface: &str) -> Result<Option<InterfaceState>, InspectionError> {
        Err(InspectionError::MissingAddress(iface.to_owned()))
    }

    async fn wan_address(&self) -> Result<Ipv4Addr, InspectionError> {
        Err(InspectionError::MissingWanAddress("eth0".to_owned()))
    }
}

pub fn wg0_state(vpn: &str) -> InterfaceState {
    InterfaceState {
        listen_port: 52805,
        private_key: "Spri".to_owned(),
        public_key: "Spub".to_owned(),
        vpn: vpn.parse().unwrap(),
    }
}

pub fn server(iface: &str, vpn: &str) -> Server {
    Server {
        iface: iface.to_owned(),
        public_key: "Spub".to_owned(),
        private_key: "Spri".to_owned(),
        wan_address: WAN,
        vpn: vpn.parse().unwrap(),
        listen_port: 52805,
    }
}

pub fn memory_registry() -> Registry {
    Registry::open("sqlite::memory:").unwrap()
}
