//! flowmeta-snmp - SNMP-backed exporter and interface resolver.
//!
//! Given an exporter IP and an ifIndex, [`SnmpResolver::lookup`] returns
//! the exporter's name and the interface's metadata from a bounded-lifetime
//! cache. Misses never block: they enqueue a background poll whose result
//! lands in the cache for a later lookup. Concurrent requests for the same
//! exporter coalesce into one poll, failing exporters are protected by a
//! per-exporter circuit breaker, entries in active use are refreshed before
//! they expire, and the cache can be persisted across restarts.
//!
//! The SNMP wire protocol itself is not implemented here; the engine talks
//! to any [`Poller`] implementation.

mod breaker;
mod cache;
mod dispatcher;
mod persist;
mod refresher;
mod worker;

pub mod config;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod poller;
pub mod resolver;

pub use config::SnmpConfig;
pub use error::{ConfigError, SnapshotError};
pub use metrics::Metrics;
pub use mock::MockPoller;
pub use poller::{PollError, PollResult, Poller};
pub use resolver::SnmpResolver;

pub use flowmeta_core::{
    Clock, ExporterKey, Interface, MockClock, Resolved, SubnetMap, SystemClock,
};

/// Cache and in-flight index: canonical exporter plus ifIndex.
///
/// ifIndex 0 is reserved for an exporter-level record.
pub(crate) type CacheKey = (ExporterKey, u32);
