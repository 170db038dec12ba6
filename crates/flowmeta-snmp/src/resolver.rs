//! The resolver component.
//!
//! Owns the cache and the background machinery: one dispatcher task, a
//! worker pool and a refresher, all stopped through a shared cancellation
//! token. [`SnmpResolver::lookup`] itself never blocks on I/O; it serves
//! the cache or enqueues background work and returns.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use flowmeta_core::{Clock, ExporterKey, Resolved};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaker::BreakerRegistry;
use crate::cache::InterfaceCache;
use crate::config::SnmpConfig;
use crate::dispatcher::{Dispatcher, LookupRequest};
use crate::error::{ConfigError, SnapshotError};
use crate::metrics::Metrics;
use crate::poller::Poller;
use crate::refresher::Refresher;
use crate::worker::{run_worker, PollContext};

/// Lookup requests buffered towards the dispatcher, per worker.
const REQUEST_QUEUE_PER_WORKER: usize = 100;
/// Poll batches buffered towards the pool, per worker.
const BATCH_QUEUE_PER_WORKER: usize = 4;

/// SNMP-backed exporter and interface resolver.
pub struct SnmpResolver {
    cache: Arc<InterfaceCache>,
    request_tx: mpsc::Sender<LookupRequest>,
    block_tx: mpsc::Sender<oneshot::Receiver<()>>,
    metrics: Metrics,
    persist_file: Option<PathBuf>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SnmpResolver {
    /// Validate the configuration, restore the snapshot if one is
    /// configured and readable, and start the background tasks.
    pub fn new(
        config: SnmpConfig,
        clock: Arc<dyn Clock>,
        poller: Arc<dyn Poller>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Metrics::new();
        let cache = Arc::new(InterfaceCache::new(
            config.cache_duration,
            config.cache_refresh,
            metrics.clone(),
        ));

        if let Some(path) = &config.cache_persist_file {
            match cache.load_file(path) {
                Ok(count) => {
                    info!(entries = count, path = %path.display(), "restored snmp cache snapshot");
                }
                Err(SnapshotError::Io(error))
                    if error.kind() == std::io::ErrorKind::NotFound =>
                {
                    debug!(path = %path.display(), "no snmp cache snapshot yet");
                }
                Err(error) => {
                    warn!(%error, path = %path.display(), "ignoring unusable snmp cache snapshot");
                }
            }
        }

        let (request_tx, request_rx) =
            mpsc::channel(REQUEST_QUEUE_PER_WORKER * config.workers);
        let (block_tx, block_rx) = mpsc::channel(1);
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_PER_WORKER * config.workers);
        let in_flight = Arc::new(Mutex::new(FxHashSet::default()));
        let shutdown = CancellationToken::new();

        // Exporter and agent addresses collapse into canonical form once,
        // here.
        let agents: FxHashMap<ExporterKey, ExporterKey> = config
            .agents
            .iter()
            .map(|(exporter, agent)| (ExporterKey::new(*exporter), ExporterKey::new(*agent)))
            .collect();

        let mut tasks = Vec::with_capacity(config.workers + 2);

        let dispatcher = Dispatcher {
            request_rx,
            block_rx,
            batch_tx,
            in_flight: in_flight.clone(),
            coalesce: config.poller_coalesce,
            metrics: metrics.clone(),
            shutdown: shutdown.clone(),
        };
        tasks.push(tokio::spawn(dispatcher.run()));

        let context = Arc::new(PollContext {
            cache: cache.clone(),
            breakers: Arc::new(BreakerRegistry::new(
                config.breaker_failure_threshold,
                config.breaker_open_duration,
            )),
            poller,
            clock: clock.clone(),
            in_flight,
            communities: config.communities.clone(),
            agents,
            ports: config.ports.clone(),
            timeout: config.poller_timeout,
            retries: config.poller_retries,
            metrics: metrics.clone(),
        });
        let batch_rx = Arc::new(tokio::sync::Mutex::new(batch_rx));
        for id in 0..config.workers {
            tasks.push(tokio::spawn(run_worker(
                id,
                batch_rx.clone(),
                context.clone(),
            )));
        }

        let refresher = Refresher {
            cache: cache.clone(),
            clock,
            request_tx: request_tx.clone(),
            interval: config.cache_check_interval,
            refresh_enabled: config.refresh_enabled(),
            metrics: metrics.clone(),
            shutdown: shutdown.clone(),
        };
        tasks.push(tokio::spawn(refresher.run()));

        info!(workers = config.workers, "snmp resolver started");
        Ok(Self {
            cache,
            request_tx,
            block_tx,
            metrics,
            persist_file: config.cache_persist_file,
            shutdown,
            tasks,
        })
    }

    /// Resolve an exporter and interface from the cache.
    ///
    /// A hit is served synchronously and refreshes the entry's last-access
    /// time. A miss enqueues a background poll (dropped if the engine is
    /// saturated) and returns `None` immediately; the caller retries
    /// implicitly with the next flow.
    pub fn lookup(&self, now: DateTime<Utc>, exporter: IpAddr, if_index: u32) -> Option<Resolved> {
        let exporter = ExporterKey::new(exporter);
        if let Some(found) = self.cache.get(now, (exporter, if_index)) {
            return Some(found);
        }
        if self
            .request_tx
            .try_send(LookupRequest { exporter, if_index })
            .is_err()
        {
            self.metrics.poller_busy_count.inc();
            debug!(%exporter, if_index, "dispatcher queue full, dropping lookup request");
        }
        None
    }

    /// The metric surface; clones share the underlying registry.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Number of cached entries.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Stop accepting work, wait for in-flight polls to finish, then save
    /// the snapshot if one is configured.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        if let Some(path) = self.persist_file.take() {
            match self.cache.save_file(&path) {
                Ok(count) => {
                    info!(entries = count, path = %path.display(), "saved snmp cache snapshot");
                }
                Err(error) => {
                    warn!(%error, path = %path.display(), "failed to save snmp cache snapshot");
                }
            }
        }
        info!("snmp resolver stopped");
    }

    /// Test hook: park the dispatcher until the returned sender resolves
    /// (or is dropped). Requests issued meanwhile queue up and coalesce.
    #[allow(dead_code)]
    pub(crate) fn block_dispatcher(&self) -> oneshot::Sender<()> {
        let (unblock, blocker) = oneshot::channel();
        let _ = self.block_tx.try_send(blocker);
        unblock
    }
}

impl Drop for SnmpResolver {
    fn drop(&mut self) {
        // Best effort: tasks stop soon after the component goes away.
        self.shutdown.cancel();
    }
}
