//! Configuration for the trawler engine.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

/// Policy for calibrating each proxy's concurrent-request ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityStrategy {
    /// Treat every live proxy as capacity 1. Suitable for cheap public
    /// proxies with unknown, usually poor, concurrency tolerance.
    Minimal,
    /// Probe each proxy with growing concurrency until a round fails,
    /// and use the discovered ceiling as its capacity.
    Auto,
}

/// Proxy-list endpoints grouped by URL scheme (http/https/socks4/socks5).
pub type SourceMap = HashMap<String, Vec<String>>;

/// Configuration for the trawler engine.
#[derive(Debug, Clone)]
pub struct TrawlerConfig {
    /// Pause between proxy re-discovery cycles.
    pub interval: Duration,
    /// Port for the monitor HTTP server.
    pub port: u16,
    /// Probe fan-out; in the minimal strategy, also the fleet-wide
    /// ceiling on concurrent fetches.
    pub workers: usize,
    /// Proxy listing endpoints grouped by scheme.
    pub sources: SourceMap,
    /// Cadence of monitor stat broadcasts.
    pub stat_interval: Duration,
    /// Capacity policy applied to every probed proxy.
    pub strategy: CapacityStrategy,
    /// Per-request deadline.
    pub timeout: Duration,
    /// URL probed to measure proxy liveness and capacity.
    pub test_target: String,
}

impl TrawlerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TrawlerConfigBuilder {
        TrawlerConfigBuilder::new()
    }
}

/// Builder for `TrawlerConfig`.
pub struct TrawlerConfigBuilder {
    interval: Option<Duration>,
    port: Option<u16>,
    workers: Option<usize>,
    sources: SourceMap,
    stat_interval: Option<Duration>,
    strategy: Option<CapacityStrategy>,
    timeout: Option<Duration>,
    test_target: Option<String>,
}

impl TrawlerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            interval: None,
            port: None,
            workers: None,
            sources: SourceMap::new(),
            stat_interval: None,
            strategy: None,
            timeout: None,
            test_target: None,
        }
    }

    /// Set the pause between proxy re-discovery cycles.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the port for the monitor HTTP server.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the probe fan-out.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Replace the whole source map.
    pub fn sources(mut self, sources: SourceMap) -> Self {
        self.sources = sources;
        self
    }

    /// Add the listing endpoints for one proxy scheme.
    pub fn source(
        mut self,
        scheme: impl Into<String>,
        links: Vec<impl Into<String>>,
    ) -> Self {
        self.sources
            .entry(scheme.into())
            .or_default()
            .extend(links.into_iter().map(Into::into));
        self
    }

    /// Set the cadence of monitor stat broadcasts.
    pub fn stat_interval(mut self, interval: Duration) -> Self {
        self.stat_interval = Some(interval);
        self
    }

    /// Set the capacity policy.
    pub fn strategy(mut self, strategy: CapacityStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the URL probed to measure proxy liveness and capacity.
    pub fn test_target(mut self, url: impl Into<String>) -> Self {
        self.test_target = Some(url.into());
        self
    }

    /// Build the configuration, applying defaults and validating that
    /// required options are present.
    pub fn build(self) -> Result<TrawlerConfig, ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Missing("sources"));
        }
        let test_target = self.test_target.ok_or(ConfigError::Missing("test_target"))?;

        Ok(TrawlerConfig {
            interval: self.interval.unwrap_or(Duration::from_secs(120)),
            port: self.port.unwrap_or(8080),
            workers: self.workers.unwrap_or(100),
            sources: self.sources,
            stat_interval: self.stat_interval.unwrap_or(Duration::from_secs(2)),
            strategy: self.strategy.unwrap_or(CapacityStrategy::Minimal),
            timeout: self.timeout.unwrap_or(Duration::from_secs(10)),
            test_target,
        })
    }
}

impl Default for TrawlerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_builder() -> TrawlerConfigBuilder {
        TrawlerConfig::builder()
            .source("http", vec!["http://lists.example/http.txt"])
            .test_target("http://probe.example")
    }

    #[test]
    fn applies_defaults() {
        let config = minimal_builder().build().unwrap();

        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, 100);
        assert_eq!(config.stat_interval, Duration::from_secs(2));
        assert_eq!(config.strategy, CapacityStrategy::Minimal);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.test_target, "http://probe.example");
    }

    #[test]
    fn keeps_explicit_values() {
        let config = minimal_builder()
            .interval(Duration::from_secs(30))
            .port(9090)
            .workers(10)
            .stat_interval(Duration::from_millis(500))
            .strategy(CapacityStrategy::Auto)
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.port, 9090);
        assert_eq!(config.workers, 10);
        assert_eq!(config.stat_interval, Duration::from_millis(500));
        assert_eq!(config.strategy, CapacityStrategy::Auto);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn requires_sources() {
        let err = TrawlerConfig::builder()
            .test_target("http://probe.example")
            .build()
            .unwrap_err();
        assert_eq!(err, crate::error::ConfigError::Missing("sources"));
    }

    #[test]
    fn requires_test_target() {
        let err = TrawlerConfig::builder()
            .source("http", vec!["http://lists.example/http.txt"])
            .build()
            .unwrap_err();
        assert_eq!(err, crate::error::ConfigError::Missing("test_target"));
    }

    #[test]
    fn source_appends_per_scheme() {
        let config = minimal_builder()
            .source("http", vec!["http://lists.example/more.txt"])
            .source("socks5", vec!["http://lists.example/socks5.txt"])
            .build()
            .unwrap();

        assert_eq!(config.sources["http"].len(), 2);
        assert_eq!(config.sources["socks5"].len(), 1);
    }
}
