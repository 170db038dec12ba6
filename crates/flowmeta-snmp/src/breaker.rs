//! Per-exporter circuit breaker.
//!
//! Tracks consecutive poll failures per exporter and short-circuits polls
//! while open. Two states:
//! - **Closed**: polls execute; reaching the failure threshold opens the
//!   breaker.
//! - **Open**: polls are skipped. Once the open duration has elapsed, the
//!   next poll closes the breaker and runs as a probe; the failure count
//!   is kept, so a failed probe re-opens immediately.
//!
//! All decisions take `now` from the injected clock, keeping the state
//! machine deterministic under mocked time.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowmeta_core::ExporterKey;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct Breaker {
    failure_threshold: u32,
    open_duration: chrono::Duration,
    inner: Mutex<BreakerInner>,
}

impl Breaker {
    fn new(failure_threshold: u32, open_duration: chrono::Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    /// Whether a poll may run now. Returns false when the breaker is open
    /// and still within its open duration; the caller skips the poll.
    pub(crate) fn allow(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if now >= inner.opened_at + self.open_duration {
                    // Probe: close, but keep the failure count so a failed
                    // probe re-opens at once.
                    inner.state = BreakerState::Closed;
                    return true;
                }
                false
            }
        }
    }

    pub(crate) fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures = 0;
        inner.state = BreakerState::Closed;
    }

    pub(crate) fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.state == BreakerState::Closed
            && inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = BreakerState::Open;
            inner.opened_at = now;
        }
    }

    #[cfg(test)]
    fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}

/// Lazily created breakers, one per exporter.
pub(crate) struct BreakerRegistry {
    failure_threshold: u32,
    open_duration: chrono::Duration,
    breakers: Mutex<FxHashMap<ExporterKey, std::sync::Arc<Breaker>>>,
}

impl BreakerRegistry {
    pub(crate) fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration: chrono::Duration::from_std(open_duration)
                .unwrap_or_else(|_| chrono::Duration::days(36500)),
            breakers: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn get(&self, exporter: ExporterKey) -> std::sync::Arc<Breaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(exporter)
            .or_insert_with(|| {
                std::sync::Arc::new(Breaker::new(self.failure_threshold, self.open_duration))
            })
            .clone()
    }
}
