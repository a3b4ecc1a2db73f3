//! Aggregated run statistics: per-proxy snapshots and completion times.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::proxy::ProxySnapshot;

/// Events published by workers to the aggregator's owner task.
#[derive(Debug)]
pub(crate) enum StatEvent {
    /// Upsert of a proxy's latest snapshot.
    Server(ProxySnapshot),
    /// One successful handler delivery.
    Completed(Instant),
}

/// Aggregate over every proxy snapshot and successful completion.
///
/// Mutation goes through the event stream consumed by
/// [`run_aggregator`]; readers take the inner lock directly.
pub struct Stats {
    targets_total: usize,
    inner: RwLock<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    servers: HashMap<String, ProxySnapshot>,
    // Append-only; ordering is what makes the rpm tail scan valid.
    timestamps: Vec<Instant>,
}

/// Wire form of the aggregate, broadcast to monitor clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatsPayload {
    pub targets: usize,
    pub rpm: usize,
    pub processed: usize,
    pub elapsed: String,
    pub servers: HashMap<String, ProxySnapshot>,
}

impl Stats {
    pub fn new(targets_total: usize) -> Self {
        Self {
            targets_total,
            inner: RwLock::new(StatsInner::default()),
        }
    }

    pub(crate) fn upsert_server(&self, snapshot: ProxySnapshot) {
        let mut inner = self.inner.write();
        inner.servers.insert(snapshot.url.clone(), snapshot);
    }

    pub(crate) fn add_timestamp(&self, at: Instant) {
        self.inner.write().timestamps.push(at);
    }

    /// Whether every target has produced a successful delivery.
    pub fn all_processed(&self) -> bool {
        self.inner.read().timestamps.len() == self.targets_total
    }

    /// Successful deliveries within the trailing sixty seconds.
    pub fn rpm(&self) -> usize {
        rpm_at(&self.inner.read().timestamps, Instant::now())
    }

    /// Span from the first to the last completion, formatted `MM:SS`.
    pub fn elapsed(&self) -> String {
        elapsed_of(&self.inner.read().timestamps)
    }

    /// The full aggregate in its wire form.
    pub fn payload(&self) -> StatsPayload {
        let inner = self.inner.read();
        StatsPayload {
            targets: self.targets_total,
            rpm: rpm_at(&inner.timestamps, Instant::now()),
            processed: inner.timestamps.len(),
            elapsed: elapsed_of(&inner.timestamps),
            servers: inner.servers.clone(),
        }
    }
}

/// Scan the timestamp tail, newest first, stopping at the first sample
/// older than one minute.
fn rpm_at(timestamps: &[Instant], now: Instant) -> usize {
    let Some(cutoff) = now.checked_sub(Duration::from_secs(60)) else {
        // The process is younger than the window; everything counts.
        return timestamps.len();
    };

    let mut rpm = 0;
    for ts in timestamps.iter().rev() {
        if *ts < cutoff {
            break;
        }
        rpm += 1;
    }
    rpm
}

fn elapsed_of(timestamps: &[Instant]) -> String {
    match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) if timestamps.len() > 1 => {
            let secs = last.duration_since(*first).as_secs();
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
        _ => "00:00".to_string(),
    }
}

/// Owner task: applies the worker event stream to the aggregate. Ends
/// when the last sender is dropped.
pub(crate) async fn run_aggregator(stats: Arc<Stats>, mut events: mpsc::Receiver<StatEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            StatEvent::Server(snapshot) => stats.upsert_server(snapshot),
            StatEvent::Completed(at) => stats.add_timestamp(at),
        }
    }
}
