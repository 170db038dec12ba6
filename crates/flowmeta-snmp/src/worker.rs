//! Poll workers.
//!
//! A fixed pool of tasks drains the batch queue. Each batch goes through
//! the community gate, agent and port resolution and the exporter's
//! breaker before the poller runs; results land in the cache, including
//! negative records for ifIndexes the exporter does not know. Whatever
//! happens, the batch's keys leave the in-flight set at the end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowmeta_core::{Clock, ExporterKey, SubnetMap};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tracing::debug;

use crate::breaker::BreakerRegistry;
use crate::cache::InterfaceCache;
use crate::config::DEFAULT_SNMP_PORT;
use crate::dispatcher::PollBatch;
use crate::metrics::Metrics;
use crate::poller::{PollError, PollResult, Poller};
use crate::CacheKey;

/// Everything a worker needs, shared by the whole pool.
pub(crate) struct PollContext {
    pub cache: Arc<InterfaceCache>,
    pub breakers: Arc<BreakerRegistry>,
    pub poller: Arc<dyn Poller>,
    pub clock: Arc<dyn Clock>,
    pub in_flight: Arc<Mutex<FxHashSet<CacheKey>>>,
    pub communities: SubnetMap<String>,
    pub agents: FxHashMap<ExporterKey, ExporterKey>,
    pub ports: SubnetMap<u16>,
    pub timeout: Duration,
    pub retries: u32,
    pub metrics: Metrics,
}

pub(crate) async fn run_worker(
    id: usize,
    batch_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PollBatch>>>,
    ctx: Arc<PollContext>,
) {
    loop {
        let batch = {
            let mut rx = batch_rx.lock().await;
            rx.recv().await
        };
        let Some(batch) = batch else { break };
        process(&ctx, &batch).await;
        clear_in_flight(&ctx, &batch);
    }
    debug!(worker = id, "snmp worker stopped");
}

async fn process(ctx: &PollContext, batch: &PollBatch) {
    let exporter = batch.exporter;

    // No community, no poll; this is a configuration gap, not an exporter
    // failure, so the breaker is left alone.
    let Some(community) = ctx.communities.lookup(exporter).cloned() else {
        debug!(%exporter, "no community configured, skipping poll");
        return;
    };
    let agent = ctx.agents.get(&exporter).copied().unwrap_or(exporter);
    let port = ctx
        .ports
        .lookup(exporter)
        .copied()
        .unwrap_or(DEFAULT_SNMP_PORT);

    let breaker = ctx.breakers.get(exporter);
    if !breaker.allow(ctx.clock.now()) {
        ctx.metrics
            .poller_breaker_open_count
            .with_label_values(&[&exporter.to_string()])
            .inc();
        debug!(%exporter, "breaker open, skipping poll");
        return;
    }

    match poll_with_retries(ctx, exporter, agent, port, &community, &batch.if_indexes).await {
        Ok(answer) => {
            let now = ctx.clock.now();
            for &if_index in &batch.if_indexes {
                // Indexes the exporter did not answer for become negative
                // records, so unknown ifIndexes do not cause poll storms.
                let interface = answer.interfaces.get(&if_index).cloned().unwrap_or_default();
                ctx.cache.put(
                    now,
                    (exporter, if_index),
                    answer.exporter_name.clone(),
                    interface,
                );
            }
            breaker.record_success();
        }
        Err(error) => {
            debug!(%exporter, %error, "snmp poll failed");
            breaker.record_failure(ctx.clock.now());
        }
    }
}

async fn poll_with_retries(
    ctx: &PollContext,
    exporter: ExporterKey,
    agent: ExporterKey,
    port: u16,
    community: &str,
    if_indexes: &[u32],
) -> Result<PollResult, PollError> {
    let mut last = PollError::NoAnswer;
    for attempt in 0..=ctx.retries {
        let poll = ctx
            .poller
            .poll(exporter, agent, port, community, if_indexes);
        match tokio::time::timeout(ctx.timeout, poll).await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(error)) => last = error,
            Err(_) => last = PollError::Timeout,
        }
        if attempt < ctx.retries {
            debug!(%exporter, attempt, "poll attempt failed, retrying");
        }
    }
    Err(last)
}

fn clear_in_flight(ctx: &PollContext, batch: &PollBatch) {
    let mut in_flight = ctx.in_flight.lock().unwrap_or_else(|e| e.into_inner());
    for &if_index in &batch.if_indexes {
        in_flight.remove(&(batch.exporter, if_index));
    }
}
