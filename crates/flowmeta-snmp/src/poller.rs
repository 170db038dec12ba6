//! Poller seam.
//!
//! The engine decides *when* to poll; a [`Poller`] implementation decides
//! *how*. Production wires in an SNMP transport; tests use
//! [`MockPoller`](crate::mock::MockPoller).

use async_trait::async_trait;
use flowmeta_core::{ExporterKey, Interface};
use rustc_hash::FxHashMap;

/// Everything one poll learned about an exporter.
///
/// Requested ifIndexes absent from `interfaces` are unknown to the
/// exporter; the engine caches them as empty records.
#[derive(Debug, Clone, Default)]
pub struct PollResult {
    pub exporter_name: String,
    pub interfaces: FxHashMap<u32, Interface>,
}

/// A poll that did not produce data.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("poll timed out")]
    Timeout,
    #[error("snmp error: {0}")]
    Snmp(String),
    #[error("exporter did not answer")]
    NoAnswer,
}

/// One SNMP exchange on behalf of the engine.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Query `agent` (usually the exporter itself) for the exporter's name
    /// and the metadata of `if_indexes`.
    async fn poll(
        &self,
        exporter: ExporterKey,
        agent: ExporterKey,
        port: u16,
        community: &str,
        if_indexes: &[u32],
    ) -> Result<PollResult, PollError>;
}
