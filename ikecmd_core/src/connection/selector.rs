//! Traffic selectors and the per-side selector sets filled in while options
//! are handled.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::error::{ConnectionError, ConnectionResult};

/// Any IP protocol.
pub const PROTOCOL_ANY: u8 = 0;

/// Full port range bounds.
pub const PORT_MIN: u16 = 0;
pub const PORT_MAX: u16 = 65535;

/// Side of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Our end
    Local,
    /// The peer's end
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Addresses covered by a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorAddress {
    /// Inclusive address range
    Range { start: IpAddr, end: IpAddr },
    /// Address assigned during negotiation (virtual IP)
    Dynamic,
}

/// An address range plus port range plus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSelector {
    /// Covered addresses
    pub address: SelectorAddress,
    /// IP protocol, 0 for any
    pub protocol: u8,
    /// First port of the range
    pub from_port: u16,
    /// Last port of the range
    pub to_port: u16,
}

impl TrafficSelector {
    /// Parse a CIDR string such as `10.0.0.0/24`. A bare address covers just
    /// that address.
    pub fn from_cidr(
        cidr: &str,
        protocol: u8,
        from_port: u16,
        to_port: u16,
    ) -> ConnectionResult<Self> {
        let net = parse_net(cidr.trim())
            .ok_or_else(|| ConnectionError::InvalidSelector(cidr.to_string()))?;

        Ok(TrafficSelector {
            address: SelectorAddress::Range {
                start: net.network(),
                end: net.broadcast(),
            },
            protocol,
            from_port,
            to_port,
        })
    }

    /// Selector whose address gets filled in by the negotiation.
    pub fn dynamic(protocol: u8, from_port: u16, to_port: u16) -> Self {
        TrafficSelector {
            address: SelectorAddress::Dynamic,
            protocol,
            from_port,
            to_port,
        }
    }

    /// Any IPv4 address, any port, any protocol.
    pub fn ipv4_any() -> Self {
        TrafficSelector {
            address: SelectorAddress::Range {
                start: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                end: IpAddr::V4(Ipv4Addr::BROADCAST),
            },
            protocol: PROTOCOL_ANY,
            from_port: PORT_MIN,
            to_port: PORT_MAX,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.address, SelectorAddress::Dynamic)
    }

    /// Whether the selector spans every port.
    pub fn covers_all_ports(&self) -> bool {
        self.from_port == PORT_MIN && self.to_port == PORT_MAX
    }

    /// Whether `addr` falls inside the selector's range. Dynamic selectors
    /// match nothing until negotiation assigns an address.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match self.address {
            SelectorAddress::Range { start, end } => match (start, end, addr) {
                (IpAddr::V4(s), IpAddr::V4(e), IpAddr::V4(a)) => s <= a && a <= e,
                (IpAddr::V6(s), IpAddr::V6(e), IpAddr::V6(a)) => s <= a && a <= e,
                _ => false,
            },
            SelectorAddress::Dynamic => false,
        }
    }
}

fn parse_net(s: &str) -> Option<IpNet> {
    if s.contains('/') {
        s.parse::<IpNet>().ok()
    } else {
        let addr = s.parse::<IpAddr>().ok()?;
        let prefix = if addr.is_ipv4() { 32 } else { 128 };
        IpNet::new(addr, prefix).ok()
    }
}

impl fmt::Display for TrafficSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            SelectorAddress::Range { start, end } => write!(f, "{}..{}", start, end)?,
            SelectorAddress::Dynamic => write!(f, "dynamic")?,
        }
        if !self.covers_all_ports() {
            write!(f, "[{}-{}]", self.from_port, self.to_port)?;
        }
        Ok(())
    }
}

/// Ordered selectors for one side of the tunnel.
///
/// Options append to the set; assembly drains it exactly once.
#[derive(Debug, Clone)]
pub struct TrafficSelectorSet {
    side: Side,
    selectors: Vec<TrafficSelector>,
}

impl TrafficSelectorSet {
    /// Local set, seeded with the dynamic virtual-IP selector. User
    /// selectors go after it.
    pub fn local() -> Self {
        TrafficSelectorSet {
            side: Side::Local,
            selectors: vec![TrafficSelector::dynamic(PROTOCOL_ANY, PORT_MIN, PORT_MAX)],
        }
    }

    /// Remote set, initially empty.
    pub fn remote() -> Self {
        TrafficSelectorSet {
            side: Side::Remote,
            selectors: Vec::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Parse `cidr` into an all-ports, any-protocol selector and append it.
    pub fn add(&mut self, cidr: &str) -> ConnectionResult<()> {
        let ts = TrafficSelector::from_cidr(cidr, PROTOCOL_ANY, PORT_MIN, PORT_MAX)?;
        debug!(side = %self.side, selector = %ts, "added traffic selector");
        self.selectors.push(ts);
        Ok(())
    }

    /// On the remote side, fall back to 0.0.0.0/0 with all ports when the
    /// user gave nothing. No-op for the local side.
    pub fn default_if_empty(&mut self) {
        if self.side == Side::Remote && self.selectors.is_empty() {
            self.selectors.push(TrafficSelector::ipv4_any());
        }
    }

    /// Take all selectors in insertion order, leaving the set empty.
    pub fn drain(&mut self) -> Vec<TrafficSelector> {
        std::mem::take(&mut self.selectors)
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_parse_ipv4_cidr() {
        let ts = TrafficSelector::from_cidr("10.0.0.0/24", 0, 0, 65535).unwrap();
        assert_eq!(
            ts.address,
            SelectorAddress::Range {
                start: "10.0.0.0".parse().unwrap(),
                end: "10.0.0.255".parse().unwrap(),
            }
        );
        assert!(ts.covers_all_ports());
        assert_eq!(ts.protocol, PROTOCOL_ANY);
        assert!(ts.contains("10.0.0.17".parse().unwrap()));
        assert!(!ts.contains("10.0.1.0".parse().unwrap()));
    }

    #[test]
    fn test_parse_host_bits_and_bare_address() {
        let ts = TrafficSelector::from_cidr("192.168.1.77/16", 0, 0, 65535).unwrap();
        assert_eq!(
            ts.address,
            SelectorAddress::Range {
                start: "192.168.0.0".parse().unwrap(),
                end: "192.168.255.255".parse().unwrap(),
            }
        );

        let ts = TrafficSelector::from_cidr("172.16.0.9", 0, 0, 65535).unwrap();
        assert_eq!(
            ts.address,
            SelectorAddress::Range {
                start: "172.16.0.9".parse().unwrap(),
                end: "172.16.0.9".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_parse_ipv6_cidr() {
        let ts = TrafficSelector::from_cidr("fd00::/64", 0, 0, 65535).unwrap();
        assert!(ts.contains(IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1))));
        assert!(!ts.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["not-a-cidr", "10.0.0.0/33", "", "10.0.0/24"] {
            match TrafficSelector::from_cidr(bad, 0, 0, 65535) {
                Err(ConnectionError::InvalidSelector(s)) => assert_eq!(s, bad),
                other => panic!("expected InvalidSelector for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_local_set_starts_with_dynamic() {
        let mut set = TrafficSelectorSet::local();
        assert_eq!(set.side(), Side::Local);
        let drained = set.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].is_dynamic());
        assert!(drained[0].covers_all_ports());
    }

    #[test]
    fn test_local_user_selectors_follow_dynamic() {
        let mut set = TrafficSelectorSet::local();
        set.add("10.1.0.0/16").unwrap();
        set.add("10.2.0.0/16").unwrap();

        let drained = set.drain();
        assert_eq!(drained.len(), 3);
        assert!(drained[0].is_dynamic());
        assert!(drained[1].contains("10.1.2.3".parse().unwrap()));
        assert!(drained[2].contains("10.2.2.3".parse().unwrap()));
    }

    #[test]
    fn test_remote_default_if_empty() {
        let mut set = TrafficSelectorSet::remote();
        assert!(set.is_empty());
        set.default_if_empty();

        let drained = set.drain();
        assert_eq!(drained, vec![TrafficSelector::ipv4_any()]);
        assert!(drained[0].contains("0.0.0.0".parse().unwrap()));
        assert!(drained[0].contains("255.255.255.255".parse().unwrap()));
        assert!(drained[0].covers_all_ports());
    }

    #[test]
    fn test_remote_default_not_added_when_user_supplied() {
        let mut set = TrafficSelectorSet::remote();
        set.add("192.168.0.0/24").unwrap();
        set.default_if_empty();
        assert_eq!(set.len(), 1);
        assert!(!set.drain()[0].contains("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_invalid_add_leaves_set_untouched() {
        let mut set = TrafficSelectorSet::remote();
        assert!(set.add("not-a-cidr").is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn test_second_drain_is_empty() {
        let mut set = TrafficSelectorSet::remote();
        set.add("10.0.0.0/8").unwrap();
        assert_eq!(set.drain().len(), 1);
        assert!(set.drain().is_empty());

        let mut set = TrafficSelectorSet::local();
        assert_eq!(set.drain().len(), 1);
        assert!(set.drain().is_empty());
    }
}
