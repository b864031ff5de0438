use std::net::Ipv4Addr;

use md5::{Digest, Md5};
use serde::Serialize;

use crate::keys::{KeyError, KeyOverride, KeyProvider};

/// Hex characters kept from the digest.
pub const ID_LEN: usize = 6;

/// Short content hash of `name ++ address`.
///
/// Only six hex characters of MD5 are kept, so two different clients can
/// collide. A collision is reported like any other duplicate identifier on
/// insert.
pub fn client_id(name: &str, address: Ipv4Addr) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hasher.update(address.to_string().as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// One peer attached to a server interface.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    #[serde(rename = "client_uuid")]
    pub id: String,
    #[serde(rename = "client_name")]
    pub name: String,
    #[serde(rename = "client_ip")]
    pub address: Ipv4Addr,
    #[serde(rename = "client_pub")]
    pub public_key: String,
    #[serde(rename = "client_pri")]
    pub private_key: String,
    pub server_iface: String,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("server_iface", &self.server_iface)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Column order of the `clients` table.
    pub const FIELDS: [&'static str; 6] = [
        "client_uuid",
        "client_name",
        "client_ip",
        "client_pub",
        "client_pri",
        "server_iface",
    ];

    /// Builds a new client, generating a keypair unless one is supplied.
    pub fn create(
        server_iface: &str,
        name: &str,
        address: Ipv4Addr,
        keys: KeyOverride,
        provider: &dyn KeyProvider,
    ) -> Result<Self, KeyError> {
        let pair = keys.resolve(provider)?;
        Ok(Self::from_parts(
            server_iface.to_owned(),
            name.to_owned(),
            address,
            pair.public_key,
            pair.private_key,
        ))
    }

    /// Rebuilds a client from stored values; the identifier is derived again.
    pub fn from_parts(
        server_iface: String,
        name: String,
        address: Ipv4Addr,
        public_key: String,
        private_key: String,
    ) -> Self {
        Self {
            id: client_id(&name, address),
            name,
            address,
            public_key,
            private_key,
            server_iface,
        }
    }

    pub fn fields(&self) -> [(&'static str, String); 6] {
        let [id, name, ip, public, private, iface] = Self::FIELDS;
        [
            (id, self.id.clone()),
            (name, self.name.clone()),
            (ip, self.address.to_string()),
            (public, self.public_key.clone()),
            (private, self.private_key.clone()),
            (iface, self.server_iface.clone()),
        ]
    }
}
