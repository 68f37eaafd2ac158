use std::{fmt, net::IpAddr};

/// Identity of one direction of a TCP conversation.
///
/// Keys compare by address value, so a v4 and a v6 representation of
/// different hosts never collide and the same quadruple always maps
/// to the same flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: IpAddr,
    pub sport: u16,
    pub dst: IpAddr,
    pub dport: u16,
}

impl FlowKey {
    /// The key of the opposite direction.
    pub fn reverse(&self) -> FlowKey {
        FlowKey {
            src: self.dst,
            sport: self.dport,
            dst: self.src,
            dport: self.sport,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}+{}:{}",
            self.src, self.sport, self.dst, self.dport
        )
    }
}

/// A captured TCP segment carrying the timestamp option, with the
/// header fields already decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpSegment {
    /// Capture time in seconds since the unix epoch.
    pub cap_tm: f64,
    /// Original packet length on the wire.
    pub wire_len: u32,
    pub key: FlowKey,
    pub tsval: u32,
    pub ecr: u32,
    pub syn: bool,
}
