//! Resolver configuration.
//!
//! Plain values only: parsing command-line flags or config files is the
//! embedding application's concern.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use flowmeta_core::SubnetMap;
use tracing::warn;

use crate::error::ConfigError;

/// Default SNMP port when no `ports` prefix covers an exporter.
pub const DEFAULT_SNMP_PORT: u16 = 161;

/// Configuration of [`SnmpResolver`](crate::SnmpResolver).
#[derive(Debug, Clone)]
pub struct SnmpConfig {
    /// Size of the poll worker pool.
    pub workers: usize,
    /// Lifetime of a cache entry.
    pub cache_duration: Duration,
    /// Age after which an entry still in use is proactively re-polled.
    /// Zero disables refreshing.
    pub cache_refresh: Duration,
    /// Period of the expiry/refresh scan.
    pub cache_check_interval: Duration,
    /// Snapshot file the cache is saved to on shutdown and restored from
    /// on construction.
    pub cache_persist_file: Option<PathBuf>,
    /// How many times a failed poll is re-issued before the failure is
    /// recorded.
    pub poller_retries: u32,
    /// Budget for a single poll attempt.
    pub poller_timeout: Duration,
    /// How long the dispatcher keeps merging requests into a batch before
    /// handing it to a worker. Zero dispatches immediately.
    pub poller_coalesce: Duration,
    /// SNMP community per exporter subnet, longest prefix wins.
    pub communities: SubnetMap<String>,
    /// Optional exporter-to-agent remapping; polls go to the agent but
    /// results are indexed by exporter. Addresses are canonicalized at
    /// construction.
    pub agents: HashMap<IpAddr, IpAddr>,
    /// SNMP port per exporter subnet, longest prefix wins.
    pub ports: SubnetMap<u16>,
    /// Consecutive poll failures before an exporter's breaker opens.
    pub breaker_failure_threshold: u32,
    /// How long an open breaker short-circuits polls before a probe.
    pub breaker_open_duration: Duration,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            cache_duration: Duration::from_secs(30 * 60),
            cache_refresh: Duration::from_secs(25 * 60),
            cache_check_interval: Duration::from_secs(2 * 60),
            cache_persist_file: None,
            poller_retries: 1,
            poller_timeout: Duration::from_secs(1),
            poller_coalesce: Duration::from_millis(10),
            communities: SubnetMap::with_default("public".to_string()),
            agents: HashMap::new(),
            ports: SubnetMap::with_default(DEFAULT_SNMP_PORT),
            breaker_failure_threshold: 5,
            breaker_open_duration: Duration::from_secs(10),
        }
    }
}

impl SnmpConfig {
    /// Whether proactive refreshing is enabled.
    pub fn refresh_enabled(&self) -> bool {
        !self.cache_refresh.is_zero()
    }

    /// Check the relationships between durations and pool sizes. Invalid
    /// combinations are fatal; one known-ambiguous combination is only
    /// warned about.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.refresh_enabled() {
            if self.cache_refresh >= self.cache_duration {
                return Err(ConfigError::RefreshNotBeforeExpiry {
                    refresh: self.cache_refresh,
                    duration: self.cache_duration,
                });
            }
            if self.cache_check_interval > self.cache_refresh {
                return Err(ConfigError::CheckIntervalTooLong {
                    interval: self.cache_check_interval,
                    refresh: self.cache_refresh,
                });
            }
            // A refresh-eligible entry can still expire unnoticed if the
            // scan period exceeds the refresh-to-expiry gap.
            if self.cache_check_interval > self.cache_duration - self.cache_refresh {
                warn!(
                    interval = ?self.cache_check_interval,
                    gap = ?(self.cache_duration - self.cache_refresh),
                    "cache check interval exceeds the refresh window, entries may expire before being refreshed"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SnmpConfig::default().validate().is_ok());
    }

    #[test]
    fn test_refresh_must_be_shorter_than_duration() {
        let config = SnmpConfig {
            cache_duration: Duration::from_secs(10 * 60),
            cache_refresh: Duration::from_secs(15 * 60),
            cache_check_interval: Duration::from_secs(60),
            ..SnmpConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RefreshNotBeforeExpiry { .. })
        ));
    }

    #[test]
    fn test_check_interval_must_fit_refresh() {
        let config = SnmpConfig {
            cache_duration: Duration::from_secs(10 * 60),
            cache_refresh: Duration::from_secs(5 * 60),
            cache_check_interval: Duration::from_secs(6 * 60),
            ..SnmpConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CheckIntervalTooLong { .. })
        ));
    }

    #[test]
    fn test_refresh_disabled_skips_checks() {
        let config = SnmpConfig {
            cache_duration: Duration::from_secs(10 * 60),
            cache_refresh: Duration::ZERO,
            cache_check_interval: Duration::from_secs(2 * 60),
            ..SnmpConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.refresh_enabled());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = SnmpConfig {
            workers: 0,
            ..SnmpConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));
    }
}
