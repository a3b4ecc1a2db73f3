//! Dispatcher: wires the subsystems together and supervises a run.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::{CapacityStrategy, TrawlerConfig};
use crate::monitor::{self, MonitorHandle};
use crate::pool::ProxyPool;
use crate::queue::TargetQueue;
use crate::stats::{self, Stats};
use crate::worker::{self, WorkerContext};

/// Buffer of the stats event channel between workers and the aggregator.
const STAT_EVENT_BUFFER: usize = 256;

/// The dispatch engine.
///
/// Build a [`TrawlerConfig`], construct the engine, then [`run`](Self::run)
/// a target list:
///
/// ```no_run
/// use trawler::{Trawler, TrawlerConfig};
///
/// # async fn example() -> Result<(), trawler::ConfigError> {
/// let config = TrawlerConfig::builder()
///     .source("http", vec!["https://lists.example/http.txt"])
///     .test_target("https://httpbin.org/status/200")
///     .build()?;
///
/// Trawler::new(config)
///     .run(vec!["https://example.com/".into()], |body| {
///         println!("got {} bytes", body.len());
///     })
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct Trawler {
    config: TrawlerConfig,
}

impl Trawler {
    pub fn new(config: TrawlerConfig) -> Self {
        Self { config }
    }

    /// Fetch every target through the proxy fleet, invoking `handler`
    /// once per successfully fetched body. Failed attempts are retried
    /// through other proxies; the call returns when every target has
    /// been delivered.
    pub async fn run<F>(&self, targets: Vec<String>, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        let config = self.config.clone();
        let queue = Arc::new(TargetQueue::new(targets));
        let stats = Arc::new(Stats::new(queue.len()));
        let monitor = MonitorHandle::new();
        let done = CancellationToken::new();

        let (live_tx, mut live_rx) = mpsc::channel(config.workers.max(1));
        let (event_tx, event_rx) = mpsc::channel(STAT_EVENT_BUFFER);

        tokio::spawn(monitor::serve(config.port, monitor.clone(), done.clone()));
        tokio::spawn(stats::run_aggregator(stats.clone(), event_rx));
        tokio::spawn(broadcast_stats(
            stats.clone(),
            monitor.clone(),
            config.stat_interval,
            done.clone(),
        ));
        tokio::spawn(ProxyPool::new(config.clone(), live_tx, monitor.clone(), done.clone()).run());

        // In the minimal strategy `workers` also bounds the fleet-wide
        // number of in-flight fetches.
        let fleet_slots = match config.strategy {
            CapacityStrategy::Minimal => Some(Arc::new(Semaphore::new(config.workers.max(1)))),
            CapacityStrategy::Auto => None,
        };

        let ctx = WorkerContext {
            queue,
            stats,
            events: event_tx,
            done: done.clone(),
            handler: Arc::new(handler),
            fleet_slots,
        };

        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                received = live_rx.recv() => match received {
                    Some(proxy) => {
                        tokio::spawn(worker::run_worker(ctx.clone(), proxy));
                    }
                    None => break,
                },
            }
        }

        // Let the final stat broadcast reach monitor clients.
        time::sleep(self.config.stat_interval).await;
    }
}

/// Periodically push the aggregate to monitor clients, with one last
/// broadcast when the run completes.
async fn broadcast_stats(
    stats: Arc<Stats>,
    monitor: MonitorHandle,
    period: Duration,
    done: CancellationToken,
) {
    let mut ticker = time::interval(period);
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                monitor.stat(&stats.payload());
                break;
            }
            _ = ticker.tick() => monitor.stat(&stats.payload()),
        }
    }
}
