use netlink_packet_core::{NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST};
use netlink_packet_route::{
    nlas::link::{Info, InfoKind, Nla},
    LinkMessage, RtnlMessage,
};

use super::{Netlink, NetlinkError};

impl Netlink {
    /// Names of all WireGuard links, in kernel index order.
    pub fn wireguard_links(&self) -> Result<Vec<String>, NetlinkError> {
        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        let messages = Self::dump::<_, RtnlMessage>(
            &self.route,
            NetlinkMessage::new(
                header,
                NetlinkPayload::from(RtnlMessage::GetLink(LinkMessage::default())),
            ),
        )?;

        Ok(messages
            .into_iter()
            .filter_map(|m| match m {
                RtnlMessage::NewLink(link) => wireguard_name(link),
                _ => None,
            })
            .collect())
    }
}

fn wireguard_name(msg: LinkMessage) -> Option<String> {
    let mut name = None;
    let mut wireguard = false;
    for nla in msg.nlas {
        match nla {
            Nla::IfName(n) => name = Some(n),
            Nla::Info(infos) => {
                wireguard |= infos
                    .iter()
                    .any(|info| matches!(info, Info::Kind(InfoKind::Wireguard)))
            }
            _ => {}
        }
    }
    name.filter(|_| wireguard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(name: &str, kind: Option<InfoKind>) -> LinkMessage {
        let mut msg = LinkMessage::default();
        msg.nlas.push(Nla::IfName(name.to_owned()));
        if let Some(kind) = kind {
            msg.nlas.push(Nla::Info(vec![Info::Kind(kind)]));
        }
        msg
    }

    #[test]
    fn only_wireguard_links_are_named() {
        assert_eq!(
            wireguard_name(link("wg1", Some(InfoKind::Wireguard))).as_deref(),
            Some("wg1")
        );
        assert_eq!(wireguard_name(link("br0", Some(InfoKind::Bridge))), None);
        assert_eq!(wireguard_name(link("eth0", None)), None);
    }
}
