use genetlink::GenetlinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetlinkError {
    #[error("Not found")]
    NotFound,
    #[error("No such device")]
    NoDevice,
    #[error("Unknown error: {0}")]
    Unknown(i32),
    #[error("Netlink io error: {0}")]
    NetlinkIo(#[from] std::io::Error),
    #[error("Netlink decode error: {0}")]
    NetlinkDecode(#[from] netlink_packet_utils::errors::DecodeError),
    #[error("Netlink decode error: {0}")]
    Genetlink(#[from] GenetlinkError),
    #[error("Netlink unexpected response")]
    UnexpectedResponse,
}

impl From<i32> for NetlinkError {
    fn from(i: i32) -> Self {
        match i {
            -2 => Self::NotFound,
            -19 => Self::NoDevice,
            i => Self::Unknown(i),
        }
    }
}

impl NetlinkError {
    /// The kernel has no interface by the requested name.
    pub fn is_missing_device(&self) -> bool {
        matches!(self, Self::NoDevice | Self::NotFound)
    }
}
