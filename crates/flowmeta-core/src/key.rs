//! Canonical exporter identity.
//!
//! All IP-keyed state (cache, breakers, agent remapping) is indexed by the
//! 16-byte canonical form of the exporter address so that an IPv4 exporter
//! and its IPv4-mapped-IPv6 representation collapse into a single key.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Canonical 128-bit form of an exporter (or agent) address.
///
/// IPv4 addresses are mapped into `::ffff:0:0/96`. Callers may pass either
/// representation; canonicalization happens once on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExporterKey(Ipv6Addr);

impl ExporterKey {
    pub fn new(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self(v4.to_ipv6_mapped()),
            IpAddr::V6(v6) => Self(v6),
        }
    }

    /// The canonical IPv6 form.
    pub fn addr(&self) -> Ipv6Addr {
        self.0
    }

    pub fn octets(&self) -> [u8; 16] {
        self.0.octets()
    }

    pub fn from_octets(octets: [u8; 16]) -> Self {
        Self(Ipv6Addr::from(octets))
    }
}

impl From<IpAddr> for ExporterKey {
    fn from(addr: IpAddr) -> Self {
        Self::new(addr)
    }
}

impl From<Ipv4Addr> for ExporterKey {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr.to_ipv6_mapped())
    }
}

impl From<Ipv6Addr> for ExporterKey {
    fn from(addr: Ipv6Addr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for ExporterKey {
    /// Unmaps back to dotted-quad where possible, for logs and metric
    /// labels.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.to_ipv4_mapped() {
            Some(v4) => v4.fmt(f),
            None => self.0.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_and_mapped_v6_collapse() {
        let plain = ExporterKey::new("127.0.0.1".parse().unwrap());
        let mapped = ExporterKey::new("::ffff:127.0.0.1".parse().unwrap());
        assert_eq!(plain, mapped);
    }

    #[test]
    fn test_display_unmaps() {
        let key = ExporterKey::new("::ffff:192.0.2.1".parse().unwrap());
        assert_eq!(key.to_string(), "192.0.2.1");

        let v6 = ExporterKey::new("2001:db8::1".parse().unwrap());
        assert_eq!(v6.to_string(), "2001:db8::1");
    }

    #[test]
    fn test_octets_round_trip() {
        let key = ExporterKey::new("192.0.2.42".parse().unwrap());
        assert_eq!(ExporterKey::from_octets(key.octets()), key);
    }
}
