mod client;
mod server;

pub use client::*;
pub use server::*;
