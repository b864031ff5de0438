use std::net::Ipv4Addr;

use cidr::Ipv4Inet;
use netlink_packet_core::{NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST};
use netlink_packet_route::{nlas::address, AddressMessage, RtnlMessage, AF_INET};

use super::{Netlink, NetlinkError};

impl Netlink {
    /// First IPv4 address (with prefix length) configured on `ifname`.
    pub fn ipv4_address(&self, ifname: &str) -> Result<Option<Ipv4Inet>, NetlinkError> {
        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        let mut message = AddressMessage::default();
        message.header.family = AF_INET as u8;
        let messages = Self::dump::<_, RtnlMessage>(
            &self.route,
            NetlinkMessage::new(header, NetlinkPayload::from(RtnlMessage::GetAddress(message))),
        )?;

        Ok(messages.into_iter().find_map(|m| match m {
            RtnlMessage::NewAddress(addr) => inet_for_label(addr, ifname),
            _ => None,
        }))
    }
}

fn inet_for_label(msg: AddressMessage, ifname: &str) -> Option<Ipv4Inet> {
    if msg.header.family != AF_INET as u8 {
        return None;
    }

    let mut label = None;
    let mut local = None;
    let mut addr = None;
    for nla in msg.nlas {
        match nla {
            address::Nla::Label(l) => label = Some(l),
            address::Nla::Local(v) => local = Some(v),
            address::Nla::Address(v) => addr = Some(v),
            _ => {}
        }
    }
    if label.as_deref() != Some(ifname) {
        return None;
    }

    let octets: [u8; 4] = local.or(addr)?.try_into().ok()?;
    Ipv4Inet::new(Ipv4Addr::from(octets), msg.header.prefix_len).ok()
}
