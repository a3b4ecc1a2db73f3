//! Proxy lifecycle manager: discovery, probing, capacity calibration,
//! and hand-off of live proxies to the dispatcher.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future;
use log::warn;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{CapacityStrategy, TrawlerConfig};
use crate::monitor::MonitorHandle;
use crate::proxy::ProxyServer;
use crate::utils;

/// Periodically curates the proxy fleet. Candidates come from the
/// configured listing endpoints, get probed for liveness and capacity,
/// and every alive proxy is handed to the dispatcher exactly once.
#[derive(Clone)]
pub(crate) struct ProxyPool {
    config: TrawlerConfig,
    live_tx: mpsc::Sender<Arc<ProxyServer>>,
    monitor: MonitorHandle,
    done: CancellationToken,
    // Published proxies by URL. A disabled entry is pruned before the
    // next cycle so a later listing can replace it with a fresh one.
    registry: Arc<Mutex<HashMap<String, Arc<ProxyServer>>>>,
}

impl ProxyPool {
    pub fn new(
        config: TrawlerConfig,
        live_tx: mpsc::Sender<Arc<ProxyServer>>,
        monitor: MonitorHandle,
        done: CancellationToken,
    ) -> Self {
        Self {
            config,
            live_tx,
            monitor,
            done,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Discovery loop: the first cycle runs immediately, then one cycle
    /// per `interval`. A panicking cycle is caught and logged and the
    /// loop keeps going.
    pub async fn run(self) {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.registry.lock().retain(|_, proxy| !proxy.is_disabled());

            if let Err(err) = tokio::spawn(self.clone().cycle()).await {
                warn!("recovered proxy cycle: {err}");
                self.monitor.log(format!("recovered proxy cycle: {err}"));
            }
        }
    }

    async fn cycle(self) {
        let candidates = self.fetch_candidates().await;
        if candidates.is_empty() {
            self.monitor.log("no proxy candidates to check");
            return;
        }
        self.probe_and_publish(candidates).await;
    }

    /// Pull every configured listing and collect the deduplicated
    /// candidate set. Individual source failures are logged and skipped.
    async fn fetch_candidates(&self) -> HashSet<Url> {
        self.monitor.log("fetching proxy lists");

        let client = reqwest::Client::new();
        let mut candidates = HashSet::new();

        for (scheme, links) in &self.config.sources {
            for link in links {
                if let Some(body) = self.fetch_source(&client, link).await {
                    candidates.extend(utils::parse_host_lines(scheme, &body));
                }
            }
        }

        candidates
    }

    async fn fetch_source(&self, client: &reqwest::Client, link: &str) -> Option<String> {
        match client.get(link).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                match response.text().await {
                    Ok(body) => Some(body),
                    Err(err) => {
                        self.monitor
                            .log(format!("error reading proxy list from {link}: {err}"));
                        None
                    }
                }
            }
            Ok(response) => {
                self.monitor.log(format!(
                    "failed to download proxy list from {link}: status {}",
                    response.status().as_u16()
                ));
                None
            }
            Err(err) => {
                self.monitor
                    .log(format!("error fetching proxies from {link}: {err}"));
                None
            }
        }
    }

    /// Probe candidates not already live, bounded by the configured
    /// fan-out, and publish the alive ones to the dispatcher.
    async fn probe_and_publish(&self, candidates: HashSet<Url>) {
        let fresh: Vec<Url> = {
            let registry = self.registry.lock();
            candidates
                .into_iter()
                .filter(|url| !registry.contains_key(url.as_str()))
                .collect()
        };
        if fresh.is_empty() {
            return;
        }

        let strategy = match self.config.strategy {
            CapacityStrategy::Minimal => "minimal",
            CapacityStrategy::Auto => "auto",
        };
        self.monitor
            .log(format!("checking {} proxies ({strategy} strategy)", fresh.len()));

        let fan_out = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let checks = fresh.into_iter().map(|url| {
            let fan_out = fan_out.clone();
            async move {
                let Ok(_permit) = fan_out.acquire_owned().await else {
                    return None;
                };
                let proxy = Arc::new(ProxyServer::new(url, self.config.timeout));
                proxy
                    .compute_capacity(self.config.strategy, &self.config.test_target)
                    .await;
                (proxy.capacity() > 0).then_some(proxy)
            }
        });

        let alive: Vec<Arc<ProxyServer>> = future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();
        self.monitor.log(format!("found {} alive proxies", alive.len()));

        for proxy in alive {
            self.registry
                .lock()
                .insert(proxy.url().as_str().to_owned(), proxy.clone());
            // The dispatcher dropping its end means the run is over.
            if self.live_tx.send(proxy).await.is_err() {
                return;
            }
        }
    }
}
