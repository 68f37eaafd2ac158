use std::net::IpAddr;

use anyhow::{bail, Context, Error};
use pcap::{Active, Capture, Linktype, Offline, Packet};

use crate::decode::LinkLayer;

/// Enough for v4/v6 + TCP + options; payloads are never inspected.
const SNAP_LEN: i32 = 144;

/// A live or offline packet source with the capture filter applied.
pub enum PacketSource {
    Live(Capture<Active>),
    File(Capture<Offline>),
}

impl PacketSource {
    pub fn open_live(ifname: &str, filter: &str) -> Result<Self, Error> {
        let mut capture = Capture::from_device(ifname)
            .and_then(|capture| {
                capture
                    .promisc(false)
                    .snaplen(SNAP_LEN)
                    .timeout(250)
                    .open()
            })
            .with_context(|| format!("Couldn't open {ifname}"))?;
        capture
            .filter(filter, true)
            .with_context(|| format!("Couldn't apply filter '{filter}'"))?;
        Ok(Self::Live(capture))
    }

    pub fn open_file(path: &str, filter: &str) -> Result<Self, Error> {
        let mut capture =
            Capture::from_file(path).with_context(|| format!("Couldn't open {path}"))?;
        capture
            .filter(filter, true)
            .with_context(|| format!("Couldn't apply filter '{filter}'"))?;
        Ok(Self::File(capture))
    }

    /// Where the IP header sits in frames from this source.
    pub fn link_layer(&self) -> Result<LinkLayer, Error> {
        let linktype = match self {
            Self::Live(capture) => capture.get_datalink(),
            Self::File(capture) => capture.get_datalink(),
        };
        Ok(match linktype {
            Linktype::ETHERNET => LinkLayer::Ethernet,
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => LinkLayer::RawIp,
            Linktype::NULL | Linktype::LOOP => LinkLayer::Null,
            Linktype::LINUX_SLL => LinkLayer::LinuxSll,
            other => bail!(
                "unsupported link type {}",
                other.get_name().unwrap_or_else(|_| other.0.to_string())
            ),
        })
    }

    pub fn next_packet(&mut self) -> Result<Packet, pcap::Error> {
        match self {
            Self::Live(capture) => capture.next_packet(),
            Self::File(capture) => capture.next_packet(),
        }
    }
}

/// First IPv4 address of the named interface, for filtering out
/// passive pings that terminate at local host applications.
///
/// An interface can carry several addresses, both families; matching
/// against the set of all of them would be more thorough, but the
/// first v4 address covers the common case.
pub fn local_addr_of(ifname: &str) -> Option<IpAddr> {
    pnet::datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == ifname)?
        .ips
        .iter()
        .map(|network| network.ip())
        .find(IpAddr::is_ipv4)
}
