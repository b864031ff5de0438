use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{info, instrument};

use crate::{
    inspector::InterfaceInspector,
    keys::{KeyError, KeyOverride, KeyProvider},
    peer::{Client, Server, ServerError},
    registry::{ClientField, Registry, RegistryError},
    render,
};

/// Interface used when none is named and none is found.
pub const DEFAULT_INTERFACE: &str = "wg0";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error("ip pool exhausted")]
    AddressPoolExhausted,
    #[error("client name is required")]
    NameRequired,
    #[error("{0} is not an assignable address of this server")]
    AddressOutOfRange(Ipv4Addr),
}

impl ServiceError {
    /// Errors an interactive caller answers by asking again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_recoverable(),
            Self::AddressPoolExhausted | Self::NameRequired | Self::AddressOutOfRange(_) => true,
            Self::Keys(KeyError::PartialOverride) => true,
            Self::Server(_) | Self::Keys(_) => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct NewClient {
    pub name: String,
    /// `None` takes the proposed address.
    pub address: Option<Ipv4Addr>,
    pub keys: KeyOverride,
}

/// Wires the collaborators to the client store.
pub struct Provisioner {
    registry: Registry,
    inspector: Box<dyn InterfaceInspector>,
    keys: Box<dyn KeyProvider>,
}

impl Provisioner {
    pub fn new(
        registry: Registry,
        inspector: Box<dyn InterfaceInspector>,
        keys: Box<dyn KeyProvider>,
    ) -> Self {
        Self {
            registry,
            inspector,
            keys,
        }
    }

    pub fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub async fn close(self) -> Result<(), ServiceError> {
        Ok(self.registry.close().await?)
    }

    /// First WireGuard interface the inspector reports, else `wg0`.
    #[instrument(skip(self))]
    pub async fn default_interface(&self) -> Result<String, ServiceError> {
        let iface = self
            .inspector
            .default_interface()
            .await
            .map_err(ServerError::from)?;
        Ok(iface.unwrap_or_else(|| DEFAULT_INTERFACE.to_owned()))
    }

    #[instrument(skip(self))]
    pub async fn server(&self, iface: &str) -> Result<Server, ServiceError> {
        Ok(Server::from_interface(iface, self.inspector.as_ref(), self.keys.as_ref()).await?)
    }

    #[instrument(skip(self))]
    pub async fn name_available(&mut self, iface: &str, name: &str) -> Result<bool, ServiceError> {
        if name.is_empty() {
            return Ok(false);
        }
        Ok(!self
            .registry
            .exists_field(iface, ClientField::Name, name)
            .await?)
    }

    #[instrument(skip(self, server), fields(iface = %server.iface))]
    pub async fn address_available(
        &mut self,
        server: &Server,
        address: Ipv4Addr,
    ) -> Result<bool, ServiceError> {
        if !server.is_assignable(address) {
            return Ok(false);
        }
        Ok(!self
            .registry
            .exists_field(&server.iface, ClientField::Address, &address.to_string())
            .await?)
    }

    #[instrument(skip(self, server), fields(iface = %server.iface))]
    pub async fn propose_address(&mut self, server: &Server) -> Result<Ipv4Addr, ServiceError> {
        self.registry
            .propose_address(server)
            .await?
            .ok_or(ServiceError::AddressPoolExhausted)
    }

    #[instrument(skip(self, server, request), fields(iface = %server.iface, name = %request.name))]
    pub async fn new_client(
        &mut self,
        server: &Server,
        request: NewClient,
    ) -> Result<Client, ServiceError> {
        if request.name.is_empty() {
            return Err(ServiceError::NameRequired);
        }

        let address = match request.address {
            Some(address) if !server.is_assignable(address) => {
                return Err(ServiceError::AddressOutOfRange(address))
            }
            Some(address) => address,
            None => self.propose_address(server).await?,
        };

        let client = Client::create(
            &server.iface,
            &request.name,
            address,
            request.keys,
            self.keys.as_ref(),
        )?;
        self.registry.insert_client(&client).await?;

        info!(id = %client.id, %address, "client added");
        Ok(client)
    }

    /// Server config with every client of the interface, plus the config of one client.
    ///
    /// The client must belong to `server`'s interface.
    #[instrument(skip(self, server), fields(iface = %server.iface))]
    pub async fn configs(
        &mut self,
        server: &Server,
        client_id: &str,
    ) -> Result<(String, String), ServiceError> {
        let clients = self.registry.list_clients(&server.iface).await?;
        let client = clients
            .iter()
            .find(|c| c.id == client_id)
            .ok_or_else(|| RegistryError::NotFound(client_id.to_owned()))?;

        Ok((
            render::server_config(server, &clients),
            render::client_config(client, server),
        ))
    }
}
