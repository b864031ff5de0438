pub mod address;
pub mod error;
pub mod link;
pub mod wireguard;

use genetlink::{new_connection, GenetlinkHandle};
use netlink_packet_core::{
    NetlinkDeserializable, NetlinkMessage, NetlinkPayload, NetlinkSerializable, NLMSG_DONE,
};

use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

use error::NetlinkError;

pub struct Netlink {
    route: Socket,
    generic: GenetlinkHandle,
}

impl Netlink {
    pub fn new() -> Result<Self, NetlinkError> {
        let socket = Socket::new(NETLINK_ROUTE)?;
        socket.connect(&SocketAddr::new(0, 0))?;
        let (conn, handle, _) = new_connection()?;
        tokio::spawn(conn);

        Ok(Self {
            route: socket,
            generic: handle,
        })
    }

    /// Sends a dump request and collects every inner message until `NLMSG_DONE`.
    pub(crate) fn dump<R, T>(sock: &Socket, mut msg: NetlinkMessage<R>) -> Result<Vec<T>, NetlinkError>
    where
        R: NetlinkSerializable,
        T: NetlinkDeserializable,
    {
        msg.finalize();

        let mut buf = vec![0; msg.buffer_len()];
        msg.serialize(&mut buf[..]);

        sock.send(&buf, 0)?;

        let mut res = Vec::new();
        let mut receive_buffer = Vec::with_capacity(8192);
        loop {
            receive_buffer.clear();
            let size = sock.recv(&mut receive_buffer, 0)?;
            let mut offset = 0;

            // one datagram may carry several messages
            while offset < size {
                let bytes = &receive_buffer[offset..size];
                let rx_packet = <NetlinkMessage<T>>::deserialize(bytes)?;
                if rx_packet.header.message_type == NLMSG_DONE {
                    return Ok(res);
                }
                let len = rx_packet.header.length as usize;
                match rx_packet.payload {
                    NetlinkPayload::InnerMessage(t) => res.push(t),
                    NetlinkPayload::Error(e) => return Err(NetlinkError::from(e.code)),
                    _ => {}
                }
                if len == 0 {
                    return Err(NetlinkError::UnexpectedResponse);
                }
                offset += (len + 3) & !3;
            }
        }
    }
}
