//! WireGuard peer provisioning: a per-interface client registry with
//! address allocation, and config rendering for both ends of a tunnel.

pub mod inspector;
pub mod keys;
pub mod netlink;
pub mod peer;
pub mod registry;
pub mod render;
pub mod service;
