//! Lookup request dispatcher.
//!
//! A single task owns all batching state. Incoming requests are
//! deduplicated against the in-flight set, merged per exporter while the
//! coalesce window is open, then handed to the worker pool over a bounded
//! queue. A full queue drops the batch rather than blocking: lookup
//! latency is the hard constraint, the next flow retries implicitly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowmeta_core::ExporterKey;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::Metrics;
use crate::CacheKey;

/// One lookup miss to resolve in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LookupRequest {
    pub exporter: ExporterKey,
    pub if_index: u32,
}

/// Coalesced poll work for one exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PollBatch {
    pub exporter: ExporterKey,
    pub if_indexes: Vec<u32>,
}

/// Requests merged per dispatch cycle before the batch is forced out.
pub(crate) const MAX_BATCH: usize = 100;

pub(crate) struct Dispatcher {
    pub request_rx: mpsc::Receiver<LookupRequest>,
    /// Test-only: a received blocker parks the dispatcher until the sender
    /// resolves it.
    pub block_rx: mpsc::Receiver<oneshot::Receiver<()>>,
    pub batch_tx: mpsc::Sender<PollBatch>,
    pub in_flight: Arc<Mutex<FxHashSet<CacheKey>>>,
    pub coalesce: Duration,
    pub metrics: Metrics,
    pub shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(blocker) = self.block_rx.recv() => {
                    let _ = blocker.await;
                }
                request = self.request_rx.recv() => match request {
                    Some(request) => self.dispatch(request).await,
                    None => break,
                },
            }
        }
        debug!("snmp dispatcher stopped");
        // Dropping batch_tx closes the worker queue; workers exit once
        // they finish what they hold.
    }

    /// One dispatch cycle: admit the triggering request, keep merging
    /// until the coalesce window closes, then flush per-exporter batches.
    async fn dispatch(&mut self, first: LookupRequest) {
        let mut pending: FxHashMap<ExporterKey, Vec<u32>> = FxHashMap::default();
        let mut merged = 0usize;
        if self.admit(first, &mut pending) {
            merged += 1;
        }

        if merged > 0 && !self.coalesce.is_zero() {
            let deadline = tokio::time::Instant::now() + self.coalesce;
            while merged < MAX_BATCH {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => break,
                    request = self.request_rx.recv() => match request {
                        Some(request) => {
                            if self.admit(request, &mut pending) {
                                merged += 1;
                            }
                        }
                        None => break,
                    },
                }
            }
        }

        if merged > 1 {
            self.metrics.poller_coalesced_count.inc_by(merged as u64);
        }
        for (exporter, if_indexes) in pending {
            self.enqueue(PollBatch {
                exporter,
                if_indexes,
            });
        }
    }

    /// Insert into the in-flight set and the pending batches. Returns
    /// false for a duplicate, which is dropped.
    fn admit(&self, request: LookupRequest, pending: &mut FxHashMap<ExporterKey, Vec<u32>>) -> bool {
        let key = (request.exporter, request.if_index);
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(key) {
                return false;
            }
        }
        pending
            .entry(request.exporter)
            .or_default()
            .push(request.if_index);
        true
    }

    fn enqueue(&self, batch: PollBatch) {
        match self.batch_tx.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(batch)) | Err(TrySendError::Closed(batch)) => {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                for &if_index in &batch.if_indexes {
                    in_flight.remove(&(batch.exporter, if_index));
                }
                drop(in_flight);
                self.metrics.poller_busy_count.inc();
                debug!(exporter = %batch.exporter, "worker queue full, dropping poll batch");
            }
        }
    }
}
