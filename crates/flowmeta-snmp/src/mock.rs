//! Scripted poller for tests.
//!
//! Answers deterministically from the exporter address: the exporter name
//! is the address with separators replaced by underscores, interface
//! `<idx>` is `Gi0/0/<idx>` at 1000 Mbps. Indexes in the unknown set get
//! no interface data, exercising the negative-cache path. Every call is
//! recorded for assertions.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flowmeta_core::{ExporterKey, Interface};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::poller::{PollError, PollResult, Poller};

/// One recorded [`Poller::poll`] invocation.
#[derive(Debug, Clone)]
pub struct PollRecord {
    pub exporter: ExporterKey,
    pub agent: ExporterKey,
    pub port: u16,
    pub community: String,
    pub if_indexes: Vec<u32>,
}

/// Configurable scripted poller.
pub struct MockPoller {
    require_community: Option<String>,
    unknown_indexes: FxHashSet<u32>,
    fail_all: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<PollRecord>>,
}

impl MockPoller {
    pub fn new() -> Self {
        let mut unknown_indexes = FxHashSet::default();
        unknown_indexes.insert(999);
        Self {
            require_community: None,
            unknown_indexes,
            fail_all: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail any poll whose community differs from `community`.
    pub fn require_community(mut self, community: &str) -> Self {
        self.require_community = Some(community.to_string());
        self
    }

    /// Answer with exporter name only (no interface data) for `if_index`.
    pub fn unknown_index(mut self, if_index: u32) -> Self {
        self.unknown_indexes.insert(if_index);
        self
    }

    /// Fail every poll, like an unreachable exporter.
    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Delay each poll, to simulate exporter latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<PollRecord> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn poll_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Recorded calls for one exporter.
    pub fn calls_for(&self, exporter: ExporterKey) -> Vec<PollRecord> {
        self.calls()
            .into_iter()
            .filter(|record| record.exporter == exporter)
            .collect()
    }
}

impl Default for MockPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Poller for MockPoller {
    async fn poll(
        &self,
        exporter: ExporterKey,
        agent: ExporterKey,
        port: u16,
        community: &str,
        if_indexes: &[u32],
    ) -> Result<PollResult, PollError> {
        {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            calls.push(PollRecord {
                exporter,
                agent,
                port,
                community: community.to_string(),
                if_indexes: if_indexes.to_vec(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all {
            return Err(PollError::NoAnswer);
        }
        if let Some(required) = &self.require_community {
            if community != required {
                return Err(PollError::Snmp(format!(
                    "community {community:?} rejected"
                )));
            }
        }

        let mut interfaces = FxHashMap::default();
        for &if_index in if_indexes {
            if self.unknown_indexes.contains(&if_index) {
                continue;
            }
            interfaces.insert(
                if_index,
                Interface {
                    name: format!("Gi0/0/{if_index}"),
                    description: format!("Interface {if_index}"),
                    speed: 1000,
                },
            );
        }
        Ok(PollResult {
            exporter_name: mangled_name(exporter),
            interfaces,
        })
    }
}

fn mangled_name(exporter: ExporterKey) -> String {
    exporter
        .to_string()
        .chars()
        .map(|c| if c == '.' || c == ':' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(addr: &str) -> ExporterKey {
        ExporterKey::new(addr.parse().unwrap())
    }

    #[tokio::test]
    async fn test_mock_answers_and_records() {
        let poller = MockPoller::new();
        let exporter = key("127.0.0.1");
        let result = poller
            .poll(exporter, exporter, 161, "public", &[765, 999])
            .await
            .unwrap();

        assert_eq!(result.exporter_name, "127_0_0_1");
        let iface = &result.interfaces[&765];
        assert_eq!(iface.name, "Gi0/0/765");
        assert_eq!(iface.description, "Interface 765");
        assert_eq!(iface.speed, 1000);
        // 999 is unknown by default.
        assert!(!result.interfaces.contains_key(&999));

        let calls = poller.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].if_indexes, vec![765, 999]);
        assert_eq!(calls[0].community, "public");
    }

    #[tokio::test]
    async fn test_mock_community_gate() {
        let poller = MockPoller::new().require_community("public");
        let exporter = key("127.0.0.2");
        assert!(poller
            .poll(exporter, exporter, 161, "private", &[1])
            .await
            .is_err());
        assert!(poller
            .poll(exporter, exporter, 161, "public", &[1])
            .await
            .is_ok());
        assert_eq!(poller.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let poller = MockPoller::new().failing();
        let exporter = key("127.0.0.1");
        assert!(matches!(
            poller.poll(exporter, exporter, 161, "public", &[1]).await,
            Err(PollError::NoAnswer)
        ));
    }

    #[tokio::test]
    async fn test_mock_v6_name_mangling() {
        let poller = MockPoller::new();
        let exporter = key("2001:db8::1");
        let result = poller
            .poll(exporter, exporter, 161, "public", &[1])
            .await
            .unwrap();
        assert_eq!(result.exporter_name, "2001_db8__1");
    }
}
