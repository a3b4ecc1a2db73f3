//! # trawler
//!
//! Fetches large sets of target URLs through a self-curating fleet of
//! public proxy servers.
//!
//! The engine continuously discovers proxy candidates from configured
//! listing endpoints, probes them for liveness and concurrency
//! capacity, and dispatches targets through every live proxy at its
//! calibrated ceiling. Failed fetches go back to the work queue and are
//! retried through other proxies; proxies that fail five times in a row
//! are disabled and drained. Each successfully fetched body is handed
//! to a user-supplied callback exactly once, and
//! [`Trawler::run`] returns when the whole target list has been
//! delivered.
//!
//! An optional monitor serves live statistics over a WebSocket; see
//! [`TrawlerConfig`] for the knobs.

pub mod config;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod stats;

mod monitor;
mod pool;
mod queue;
mod request;
#[cfg(test)]
mod testutil;
mod utils;
mod worker;

pub use config::{CapacityStrategy, SourceMap, TrawlerConfig, TrawlerConfigBuilder};
pub use engine::Trawler;
pub use error::{ConfigError, FetchError};
pub use proxy::{ProxyServer, ProxySnapshot};
pub use stats::{Stats, StatsPayload};
