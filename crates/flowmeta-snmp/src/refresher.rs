//! Periodic cache maintenance.
//!
//! Every `cache_check_interval`, as measured by the injected clock:
//! evict entries past their expiry, then submit refresh polls for entries
//! that reached the refresh age and are still being served. Refresh
//! submissions take the normal dispatcher path, so they deduplicate
//! against user lookups through the in-flight set.

use std::sync::Arc;
use std::time::Duration;

use flowmeta_core::Clock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::InterfaceCache;
use crate::dispatcher::LookupRequest;
use crate::metrics::Metrics;

pub(crate) struct Refresher {
    pub cache: Arc<InterfaceCache>,
    pub clock: Arc<dyn Clock>,
    pub request_tx: mpsc::Sender<LookupRequest>,
    pub interval: Duration,
    pub refresh_enabled: bool,
    pub metrics: Metrics,
    pub shutdown: CancellationToken,
}

impl Refresher {
    pub(crate) async fn run(self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep(self.interval) => {}
            }
            self.tick();
        }
        debug!("snmp cache refresher stopped");
    }

    fn tick(&self) {
        self.metrics.cache_refresh_runs.inc();
        let now = self.clock.now();

        for key in self.cache.expired_before(now) {
            self.cache.delete(&key);
            self.metrics.cache_expired.inc();
        }

        if !self.refresh_enabled {
            return;
        }
        for (exporter, if_index) in self.cache.needing_refresh(now) {
            match self.request_tx.try_send(LookupRequest { exporter, if_index }) {
                Ok(()) => self.metrics.cache_refresh.inc(),
                Err(_) => {
                    // Same backpressure rule as user lookups: drop, the
                    // next scan tries again.
                    self.metrics.poller_busy_count.inc();
                    debug!(%exporter, if_index, "dispatcher queue full, skipping refresh");
                }
            }
        }
    }
}
