use netlink_packet_wireguard::{constants::WG_KEY_LEN, nlas::WgDeviceAttrs, Wireguard};

#[derive(Debug, Default)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub private_key: [u8; WG_KEY_LEN],
    pub public_key: [u8; WG_KEY_LEN],
    pub listen_port: u16,
}

impl Interface {
    /// An interface that exists but never had a key set (`wg showconf` prints nothing useful).
    pub fn is_configured(&self) -> bool {
        self.private_key != [0; WG_KEY_LEN]
    }
}

impl From<Wireguard> for Interface {
    fn from(wg: Wireguard) -> Self {
        let mut res = Self::default();
        for nla in wg.nlas {
            match nla {
                WgDeviceAttrs::IfIndex(v) => {
                    res.index = v;
                }
                WgDeviceAttrs::IfName(v) => {
                    res.name = v;
                }
                WgDeviceAttrs::PrivateKey(pk) => {
                    res.private_key = pk;
                }
                WgDeviceAttrs::PublicKey(pk) => {
                    res.public_key = pk;
                }
                WgDeviceAttrs::ListenPort(v) => {
                    res.listen_port = v;
                }
                _ => (),
            }
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlink_packet_wireguard::WireguardCmd;

    #[test]
    fn parses_device_attributes() {
        let iface = Interface::from(Wireguard {
            cmd: WireguardCmd::GetDevice,
            nlas: vec![
                WgDeviceAttrs::IfIndex(7),
                WgDeviceAttrs::IfName("wg0".to_owned()),
                WgDeviceAttrs::PrivateKey([1; WG_KEY_LEN]),
                WgDeviceAttrs::PublicKey([2; WG_KEY_LEN]),
                WgDeviceAttrs::ListenPort(52805),
            ],
        });
        assert_eq!(iface.index, 7);
        assert_eq!(iface.name, "wg0");
        assert_eq!(iface.listen_port, 52805);
        assert!(iface.is_configured());
        assert!(!Interface::default().is_configured());
    }
}
