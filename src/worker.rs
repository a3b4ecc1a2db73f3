//! Per-proxy worker: draws target batches and runs bounded concurrent
//! fetches through one live proxy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::proxy::ProxyServer;
use crate::queue::TargetQueue;
use crate::request;
use crate::stats::{StatEvent, Stats};

/// Idle pause while other proxies drain the remaining in-flight work.
const EMPTY_BATCH_PAUSE: Duration = Duration::from_secs(1);

pub(crate) type Handler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Shared collaborators handed to every per-proxy worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<TargetQueue>,
    pub stats: Arc<Stats>,
    pub events: mpsc::Sender<StatEvent>,
    pub done: CancellationToken,
    pub handler: Handler,
    /// Fleet-wide cap on in-flight fetches. Present in the minimal
    /// strategy, where `workers` bounds overall parallelism; absent in
    /// auto, where the calibrated capacities are the bound.
    pub fleet_slots: Option<Arc<Semaphore>>,
}

/// Drive one live proxy until it is disabled or the run completes.
///
/// Each loop turn shifts up to `capacity` targets and dispatches them
/// as concurrent tasks gated by the slot semaphore, so the proxy never
/// carries more than its calibrated ceiling.
pub(crate) async fn run_worker(ctx: WorkerContext, proxy: Arc<ProxyServer>) {
    let capacity = proxy.capacity();
    if capacity == 0 {
        return;
    }
    let slots = Arc::new(Semaphore::new(capacity));

    loop {
        if proxy.is_disabled() {
            break;
        }

        let batch = ctx.queue.shift(capacity);
        if batch.is_empty() {
            if ctx.stats.all_processed() {
                // First worker to observe completion ends the run; the
                // token makes concurrent observers harmless.
                ctx.done.cancel();
                break;
            }
            time::sleep(EMPTY_BATCH_PAUSE).await;
            continue;
        }

        for target in batch {
            let Ok(permit) = slots.clone().acquire_owned().await else {
                return;
            };
            let fleet_permit = match &ctx.fleet_slots {
                Some(fleet) => match fleet.clone().acquire_owned().await {
                    Ok(fleet_permit) => Some(fleet_permit),
                    Err(_) => return,
                },
                None => None,
            };
            tokio::spawn(process_target(
                ctx.clone(),
                proxy.clone(),
                target,
                permit,
                fleet_permit,
            ));
        }
    }
}

/// One fetch attempt: metric bookkeeping, the request itself, delivery
/// or re-enqueue. The slot permits are released on every exit path.
async fn process_target(
    ctx: WorkerContext,
    proxy: Arc<ProxyServer>,
    target: String,
    _permit: OwnedSemaphorePermit,
    _fleet_permit: Option<OwnedSemaphorePermit>,
) {
    let (started_at, before) = proxy.start();
    if !before.disabled {
        let _ = ctx.events.send(StatEvent::Server(before)).await;
    }

    let token = proxy.cancel_token();
    let result = request::fetch_via_proxy(&token, &target, proxy.url(), proxy.timeout()).await;

    let after = proxy.finish(started_at, result.as_ref().err());
    match result {
        Ok(body) => {
            (ctx.handler)(body);
            let _ = ctx.events.send(StatEvent::Completed(Instant::now())).await;
        }
        Err(_) => ctx.queue.push(target),
    }

    if !after.disabled {
        let _ = ctx.events.send(StatEvent::Server(after)).await;
    }
}
