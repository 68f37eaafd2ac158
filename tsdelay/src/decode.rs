use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TcpOptionElement, TcpOptionsIterator, TransportSlice};
use tsdelay_core::{FlowKey, Reject, TcpSegment};

/// How far into each captured frame the IP header is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// No link header at all, the capture starts at the IP header.
    RawIp,
    /// BSD loopback: a 4-byte host-order address family.
    Null,
    /// Linux cooked capture: a 16-byte pseudo header.
    LinuxSll,
}

/// Decode one captured frame into a [`TcpSegment`], or say why not.
pub fn decode(
    link: LinkLayer,
    data: &[u8],
    cap_tm: f64,
    wire_len: u32,
) -> Result<TcpSegment, Reject> {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data),
        LinkLayer::RawIp => SlicedPacket::from_ip(data),
        LinkLayer::Null => SlicedPacket::from_ip(data.get(4..).ok_or(Reject::NotV4OrV6)?),
        LinkLayer::LinuxSll => SlicedPacket::from_ip(data.get(16..).ok_or(Reject::NotV4OrV6)?),
    }
    .map_err(|_| Reject::NotV4OrV6)?;

    let (src, dst) = match &sliced.net {
        Some(NetSlice::Ipv4(v4)) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(v6)) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
        _ => return Err(Reject::NotV4OrV6),
    };

    let Some(TransportSlice::Tcp(tcp)) = &sliced.transport else {
        return Err(Reject::NotTcp);
    };

    let timestamp = TcpOptionsIterator::from_slice(tcp.options())
        .flatten()
        .find_map(|option| match option {
            TcpOptionElement::Timestamp(tsval, ecr) => Some((tsval, ecr)),
            _ => None,
        });
    let Some((tsval, ecr)) = timestamp else {
        return Err(Reject::NoTimestamp);
    };

    Ok(TcpSegment {
        cap_tm,
        wire_len,
        key: FlowKey {
            src,
            sport: tcp.source_port(),
            dst,
            dport: tcp.destination_port(),
        },
        tsval,
        ecr,
        syn: tcp.syn(),
    })
}
