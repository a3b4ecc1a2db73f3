//! Proxy entry: identity, guarded metrics, and lifecycle handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::CapacityStrategy;
use crate::error::FetchError;
use crate::request;

/// Width of the consecutive-outcome window used by the failure policy.
const OUTCOME_WINDOW: usize = 5;

/// Ceiling for auto calibration so a pathologically permissive proxy
/// cannot stretch probing forever.
const MAX_AUTO_CAPACITY: usize = 32;

/// One upstream proxy server with its mutable health metrics.
///
/// An entry is created during probing and lives until it is disabled
/// (five consecutive failures) or replaced by a later re-probe.
pub struct ProxyServer {
    url: Url,
    timeout: Duration,
    cancel: CancellationToken,
    disabled: AtomicBool,
    metrics: Mutex<Metrics>,
}

#[derive(Default)]
struct Metrics {
    latency_ms: u64,
    active: i64,
    positive: u64,
    negative: u64,
    capacity: usize,
    // Rolling window of the last five request outcomes, true = success.
    window: [bool; OUTCOME_WINDOW],
    window_idx: usize,
}

/// Point-in-time view of a proxy's metrics, as published to the stats
/// aggregator and the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySnapshot {
    pub url: String,
    pub disabled: bool,
    pub latency: u64,
    pub capacity: usize,
    pub requests: i64,
    pub positive: u64,
    pub negative: u64,
    pub efficiency: u32,
}

impl ProxyServer {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            cancel: CancellationToken::new(),
            disabled: AtomicBool::new(false),
            metrics: Mutex::new(Metrics::default()),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token fired when the proxy is disabled; requests in flight
    /// through this proxy run under it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.metrics.lock().capacity
    }

    /// Mark the beginning of a request: bumps the in-flight counter and
    /// returns the start instant with a snapshot of the current state.
    pub fn start(&self) -> (Instant, ProxySnapshot) {
        let mut m = self.metrics.lock();
        m.active += 1;
        (Instant::now(), self.snapshot_locked(&m))
    }

    /// Record the completion of a request started at `started_at`.
    ///
    /// Updates latency and the positive/negative counters, advances the
    /// outcome window, and disables the proxy once the window holds
    /// five failures.
    pub fn finish(&self, started_at: Instant, err: Option<&FetchError>) -> ProxySnapshot {
        let mut m = self.metrics.lock();
        m.latency_ms = started_at.elapsed().as_millis() as u64;
        m.active -= 1;

        let ok = err.is_none();
        if ok {
            m.positive += 1;
        } else {
            m.negative += 1;
        }
        let idx = m.window_idx;
        m.window[idx] = ok;
        m.window_idx = (m.window_idx + 1) % OUTCOME_WINDOW;

        if m.window.iter().all(|&outcome| !outcome) {
            self.disable();
        }

        self.snapshot_locked(&m)
    }

    /// Latch the disabled flag and abort in-flight requests. The flag
    /// latches on the first call; later calls do not re-cancel.
    pub fn disable(&self) {
        if !self.disabled.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
        }
    }

    /// Calibrate this proxy's concurrent-request ceiling against
    /// `probe_url` and store it as the capacity. Probe outcomes count
    /// toward the positive/negative metrics like any other request.
    pub async fn compute_capacity(&self, strategy: CapacityStrategy, probe_url: &str) {
        let capacity = match strategy {
            CapacityStrategy::Minimal => self.minimal_capacity(probe_url).await,
            CapacityStrategy::Auto => self.auto_capacity(probe_url).await,
        };
        self.metrics.lock().capacity = capacity;
    }

    async fn minimal_capacity(&self, probe_url: &str) -> usize {
        let token = CancellationToken::new();
        match self.probe(&token, probe_url).await {
            Ok(()) => 1,
            Err(_) => 0,
        }
    }

    /// Issue 1, 2, … concurrent probes until a round fails. The last
    /// fully successful round size is the capacity; a failure on the
    /// very first round marks the proxy unusable.
    async fn auto_capacity(&self, probe_url: &str) -> usize {
        let mut capacity = 1usize;
        loop {
            let token = CancellationToken::new();
            let round = (0..capacity).map(|_| self.probe(&token, probe_url));
            let failed = futures::future::join_all(round)
                .await
                .iter()
                .any(Result::is_err);

            if failed {
                capacity -= 1;
                break;
            }
            if capacity == MAX_AUTO_CAPACITY {
                break;
            }
            capacity += 1;
        }
        capacity
    }

    async fn probe(&self, token: &CancellationToken, probe_url: &str) -> Result<(), FetchError> {
        let (started_at, _) = self.start();
        let result = request::fetch_via_proxy(token, probe_url, &self.url, self.timeout).await;
        self.finish(started_at, result.as_ref().err());
        result.map(|_| ())
    }

    /// Current metrics as a snapshot.
    pub fn snapshot(&self) -> ProxySnapshot {
        let m = self.metrics.lock();
        self.snapshot_locked(&m)
    }

    fn snapshot_locked(&self, m: &Metrics) -> ProxySnapshot {
        ProxySnapshot {
            url: self.url.as_str().to_owned(),
            disabled: self.is_disabled(),
            latency: m.latency_ms,
            capacity: m.capacity,
            requests: m.active,
            positive: m.positive,
            negative: m.negative,
            efficiency: efficiency(m.positive, m.negative),
        }
    }
}

/// Success rate as a rounded percentage; 0 when there are no samples.
fn efficiency(positive: u64, negative: u64) -> u32 {
    let total = positive + negative;
    if total == 0 {
        return 0;
    }
    ((positive * 100) as f64 / total as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::concurrency_limited_proxy;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_proxy() -> ProxyServer {
        ProxyServer::new(
            Url::parse("http://127.0.0.1:3128").unwrap(),
            Duration::from_secs(5),
        )
    }

    fn past(ms: u64) -> Instant {
        Instant::now() - Duration::from_millis(ms)
    }

    #[test]
    fn start_increments_the_inflight_counter() {
        let proxy = test_proxy();
        let (_, snapshot) = proxy.start();
        assert_eq!(snapshot.requests, 1);
    }

    #[test]
    fn finish_records_a_success() {
        let proxy = test_proxy();
        let (started_at, _) = proxy.start();
        let snapshot = proxy.finish(started_at, None);

        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.positive, 1);
        assert_eq!(snapshot.negative, 0);
        assert!(!snapshot.disabled);
    }

    #[test]
    fn finish_records_a_failure_with_latency() {
        let proxy = test_proxy();
        proxy.start();
        let snapshot = proxy.finish(past(100), Some(&FetchError::Timeout));

        assert_eq!(snapshot.positive, 0);
        assert_eq!(snapshot.negative, 1);
        assert!(snapshot.latency >= 100);
    }

    #[test]
    fn five_consecutive_failures_disable_the_proxy() {
        let proxy = test_proxy();

        // Two successes first, as a freshly probed proxy would have.
        for _ in 0..2 {
            let (t0, _) = proxy.start();
            proxy.finish(t0, None);
        }
        for i in 0..5 {
            let (t0, _) = proxy.start();
            let snapshot = proxy.finish(t0, Some(&FetchError::HttpStatus(502)));
            assert_eq!(snapshot.disabled, i == 4, "failure #{}", i + 1);
        }

        assert!(proxy.is_disabled());
        assert!(proxy.cancel_token().is_cancelled());
    }

    #[test]
    fn a_success_resets_the_failure_streak() {
        let proxy = test_proxy();
        let outcomes = [
            Ok(()),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
            Ok(()),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
            Err(FetchError::Timeout),
        ];
        for outcome in &outcomes {
            let (t0, _) = proxy.start();
            proxy.finish(t0, outcome.as_ref().err());
        }
        // Never five failures in a row, so the window never fills.
        assert!(!proxy.is_disabled());

        let (t0, _) = proxy.start();
        proxy.finish(t0, Some(&FetchError::Timeout));
        assert!(proxy.is_disabled());
    }

    #[test]
    fn a_failure_on_a_never_successful_proxy_disables_it() {
        // The window starts empty, which reads as failures; a probe
        // success is what arms a fresh proxy in practice.
        let proxy = test_proxy();
        let (t0, _) = proxy.start();
        let snapshot = proxy.finish(t0, Some(&FetchError::Timeout));
        assert!(snapshot.disabled);
    }

    #[test]
    fn disable_is_idempotent() {
        let proxy = test_proxy();
        proxy.disable();
        assert!(proxy.is_disabled());
        proxy.disable();
        assert!(proxy.is_disabled());
        assert!(proxy.cancel_token().is_cancelled());
    }

    #[test]
    fn efficiency_with_no_samples_is_zero() {
        assert_eq!(efficiency(0, 0), 0);
    }

    #[test]
    fn efficiency_rounds_the_success_rate() {
        assert_eq!(efficiency(80, 20), 80);
        assert_eq!(efficiency(10, 2), 83);
        assert_eq!(efficiency(0, 7), 0);
    }

    #[test]
    fn snapshot_round_trips_through_serde() {
        let snapshot = ProxySnapshot {
            url: "http://1.2.3.4:8080/".into(),
            disabled: false,
            latency: 120,
            capacity: 3,
            requests: 2,
            positive: 10,
            negative: 2,
            efficiency: 83,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: ProxySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[tokio::test]
    async fn minimal_capacity_counts_the_probe() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let proxy = ProxyServer::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5));
        proxy
            .compute_capacity(CapacityStrategy::Minimal, "http://targets.invalid/probe")
            .await;

        let snapshot = proxy.snapshot();
        assert_eq!(snapshot.capacity, 1);
        assert_eq!(snapshot.positive, 1);
        assert_eq!(snapshot.negative, 0);
    }

    #[tokio::test]
    async fn minimal_capacity_is_zero_when_the_probe_fails() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let proxy = ProxyServer::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5));
        proxy
            .compute_capacity(CapacityStrategy::Minimal, "http://targets.invalid/probe")
            .await;

        assert_eq!(proxy.capacity(), 0);
        assert_eq!(proxy.snapshot().negative, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auto_capacity_stops_at_the_concurrency_ceiling() {
        // The mock tolerates 3 in-flight requests; the round of 4 fails
        // and calibration settles on the last fully successful round.
        let proxy_url = concurrency_limited_proxy(3, Duration::from_millis(250)).await;
        let proxy = ProxyServer::new(proxy_url, Duration::from_secs(5));

        proxy
            .compute_capacity(CapacityStrategy::Auto, "http://targets.invalid/probe")
            .await;

        let snapshot = proxy.snapshot();
        assert_eq!(snapshot.capacity, 3);
        assert!(snapshot.negative >= 1);
    }

    #[tokio::test]
    async fn auto_capacity_is_zero_when_a_single_probe_fails() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let proxy = ProxyServer::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5));
        proxy
            .compute_capacity(CapacityStrategy::Auto, "http://targets.invalid/probe")
            .await;

        assert_eq!(proxy.capacity(), 0);
    }
}
