//! Error taxonomy of the resolver.
//!
//! Only two kinds of failure ever surface to the embedding application:
//! invalid configuration (fatal, at construction) and snapshot problems
//! (reported, then ignored in favor of a cold start). Poll failures stay
//! inside the engine and feed the per-exporter breaker.

use std::time::Duration;

/// Invalid configuration, detected at construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cache refresh ({refresh:?}) must be shorter than cache duration ({duration:?})")]
    RefreshNotBeforeExpiry { refresh: Duration, duration: Duration },
    #[error("cache check interval ({interval:?}) must not exceed cache refresh ({refresh:?})")]
    CheckIntervalTooLong { interval: Duration, refresh: Duration },
    #[error("at least one worker is required")]
    NoWorkers,
}

/// A cache snapshot could not be written or read back.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The file is not a snapshot this version understands. The caller
    /// treats this as a cold start.
    #[error("corrupted cache snapshot: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
