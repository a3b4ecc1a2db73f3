//! Error types for the trawler crate.

use thiserror::Error;

/// Reasons a single fetch through a proxy can fail.
///
/// None of these surface to the caller of
/// [`Trawler::run`](crate::Trawler::run); a failed target goes back to
/// the queue and the proxy's counters absorb the outcome.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure reaching the proxy, or the target through it.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The target answered with a non-200 status.
    #[error("unexpected status {0}")]
    HttpStatus(u16),

    /// The per-request deadline expired.
    #[error("request timed out")]
    Timeout,

    /// The proxy was disabled while the request was in flight.
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Classify a reqwest failure, separating deadline expiry from
    /// other transport problems.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Configuration errors reported by
/// [`TrawlerConfigBuilder::build`](crate::TrawlerConfigBuilder::build).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option was left unset.
    #[error("option \"{0}\" is required")]
    Missing(&'static str),
}
