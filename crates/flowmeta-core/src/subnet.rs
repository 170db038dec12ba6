//! Longest-prefix subnet map.
//!
//! Maps IP prefixes to values over the canonical IPv6 space; the value of
//! the longest covering prefix wins. Used for per-exporter settings such
//! as SNMP communities and ports. Entries are kept sorted by descending
//! prefix length and scanned linearly, which is plenty for config-sized
//! maps.

use std::net::IpAddr;

use crate::key::ExporterKey;

/// Error building a [`SubnetMap`] from textual prefixes.
#[derive(Debug, thiserror::Error)]
pub enum SubnetParseError {
    #[error("invalid IP prefix {0:?}")]
    InvalidPrefix(String),
    #[error("invalid prefix length in {0:?}")]
    InvalidPrefixLength(String),
}

#[derive(Debug, Clone)]
struct SubnetEntry<T> {
    /// Network bits of the canonical IPv6 prefix, already masked.
    network: u128,
    prefix_len: u8,
    value: T,
}

/// Longest-prefix match over canonical IPv6 prefixes.
#[derive(Debug, Clone, Default)]
pub struct SubnetMap<T> {
    entries: Vec<SubnetEntry<T>>,
}

impl<T> SubnetMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A map whose only entry is `::/0`, i.e. a plain default value.
    pub fn with_default(value: T) -> Self {
        Self {
            entries: vec![SubnetEntry {
                network: 0,
                prefix_len: 0,
                value,
            }],
        }
    }

    /// Build a map from `(prefix, value)` pairs.
    ///
    /// Prefixes use the usual textual form: `"::/0"`,
    /// `"::ffff:127.0.0.1/128"`, `"192.0.2.0/24"`. IPv4 prefixes shift
    /// into the v4-mapped space (`/24` becomes `/120`). A bare address is
    /// a host prefix.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, SubnetParseError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for (prefix, value) in entries {
            map.insert(prefix.as_ref(), value)?;
        }
        Ok(map)
    }

    /// Insert one prefix, replacing any entry with the same network and
    /// length.
    pub fn insert(&mut self, prefix: &str, value: T) -> Result<(), SubnetParseError> {
        let (addr, prefix_len) = parse_prefix(prefix)?;
        let network = u128::from_be_bytes(addr.octets()) & mask(prefix_len);
        match self
            .entries
            .iter_mut()
            .find(|e| e.network == network && e.prefix_len == prefix_len)
        {
            Some(entry) => entry.value = value,
            None => {
                self.entries.push(SubnetEntry {
                    network,
                    prefix_len,
                    value,
                });
                // Longest prefix first, so lookup is first-match.
                self.entries.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
            }
        }
        Ok(())
    }

    /// Value of the longest prefix covering `key`, if any.
    pub fn lookup(&self, key: ExporterKey) -> Option<&T> {
        let bits = u128::from_be_bytes(key.octets());
        self.entries
            .iter()
            .find(|e| bits & mask(e.prefix_len) == e.network)
            .map(|e| &e.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        len => u128::MAX << (128 - u32::from(len)),
    }
}

fn parse_prefix(prefix: &str) -> Result<(ExporterKey, u8), SubnetParseError> {
    let (addr_part, len_part) = match prefix.split_once('/') {
        Some((addr, len)) => (addr, Some(len)),
        None => (prefix, None),
    };
    let addr: IpAddr = addr_part
        .parse()
        .map_err(|_| SubnetParseError::InvalidPrefix(prefix.to_string()))?;
    let max_len = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    let len = match len_part {
        Some(len) => len
            .parse::<u8>()
            .ok()
            .filter(|l| *l <= max_len)
            .ok_or_else(|| SubnetParseError::InvalidPrefixLength(prefix.to_string()))?,
        None => max_len,
    };
    // IPv4 prefixes live in the v4-mapped part of the IPv6 space.
    let len = match addr {
        IpAddr::V4(_) => len + 96,
        IpAddr::V6(_) => len,
    };
    Ok((ExporterKey::new(addr), len))
}
