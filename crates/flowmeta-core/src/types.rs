//! Interface metadata types served by the resolver.

/// Metadata for one interface of an exporter.
///
/// An empty value (all fields at their defaults) is meaningful: it records
/// that the exporter answered but does not know the requested ifIndex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    /// Interface name (ifName), e.g. `Gi0/0/765`.
    pub name: String,
    /// Interface description (ifDescr).
    pub description: String,
    /// Interface speed in Mbps (ifHighSpeed).
    pub speed: u32,
}

impl Interface {
    /// True for the negative-cache record of an unknown ifIndex.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.description.is_empty() && self.speed == 0
    }
}

/// A successful lookup answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Human-readable exporter name (sysName).
    pub exporter_name: String,
    /// Interface metadata; may be empty for a known exporter with an
    /// unknown ifIndex.
    pub interface: Interface,
}
