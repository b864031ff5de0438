//! WireGuard config text for both ends of a tunnel.
//!
//! Every block ends with a newline; blocks are joined by an empty line.

use crate::peer::{Client, Server};

/// Prefix length written next to client addresses.
pub const CLIENT_PREFIX: u8 = 22;
/// Port clients dial on the server's WAN address.
pub const ENDPOINT_PORT: u16 = 51820;
pub const PERSISTENT_KEEPALIVE: u16 = 21;

const BLOCK_SEPARATOR: &str = "\n";

pub fn server_interface_block(server: &Server) -> String {
    format!(
        "[Interface]
ListenPort = {port}
PrivateKey = {priv_key}
",
        port = server.listen_port,
        priv_key = server.private_key,
    )
}

pub fn server_peer_block(client: &Client) -> String {
    format!(
        "[Peer]
PublicKey = {pub_key}
AllowedIPs = {ip}/{prefix}
",
        pub_key = client.public_key,
        ip = client.address,
        prefix = CLIENT_PREFIX,
    )
}

/// Peers appear in the order given.
pub fn server_config(server: &Server, clients: &[Client]) -> String {
    std::iter::once(server_interface_block(server))
        .chain(clients.iter().map(server_peer_block))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

pub fn client_interface_block(client: &Client, server: &Server) -> String {
    format!(
        "[Interface]
Address = {ip}/{prefix}
PrivateKey = {priv_key}
DNS = {dns}
",
        ip = client.address,
        prefix = CLIENT_PREFIX,
        priv_key = client.private_key,
        dns = server.vpn_address(),
    )
}

pub fn client_peer_block(server: &Server) -> String {
    format!(
        "[Peer]
PublicKey = {pub_key}
Endpoint = {endpoint}:{port}
AllowedIPs = 0.0.0.0/0, ::/0
PersistentKeepalive = {keepalive}
",
        pub_key = server.public_key,
        endpoint = server.wan_address,
        port = ENDPOINT_PORT,
        keepalive = PERSISTENT_KEEPALIVE,
    )
}

pub fn client_config(client: &Client, server: &Server) -> String {
    [client_interface_block(client, server), client_peer_block(server)].join(BLOCK_SEPARATOR)
}
