mod interface;

pub use interface::*;

use futures::StreamExt;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_DUMP, NLM_F_REQUEST};
use netlink_packet_generic::GenlMessage;
use netlink_packet_wireguard::{nlas::WgDeviceAttrs, Wireguard, WireguardCmd};

use super::{Netlink, NetlinkError};

impl Netlink {
    pub async fn wg_interface(&mut self, ifname: &str) -> Result<Interface, NetlinkError> {
        let genlmsg: GenlMessage<Wireguard> = GenlMessage::from_payload(Wireguard {
            cmd: WireguardCmd::GetDevice,
            nlas: vec![WgDeviceAttrs::IfName(ifname.to_owned())],
        });

        let mut nlmsg = NetlinkMessage::from(genlmsg);
        nlmsg.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        let mut responses = self.generic.request(nlmsg).await?;

        while let Some(result) = responses.next().await {
            let resp = result?;
            match resp.payload {
                NetlinkPayload::InnerMessage(genlmsg) => {
                    return Ok(Interface::from(genlmsg.payload))
                }
                NetlinkPayload::Error(err) => return Err(NetlinkError::from(err.code)),
                _ => {}
            }
        }

        Err(NetlinkError::UnexpectedResponse)
    }
}
