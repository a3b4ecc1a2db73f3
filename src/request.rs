//! Single GET through a proxy with a cancellable deadline.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::FetchError;

/// Browser-like User-Agent strings rotated across requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_3) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (X11; Linux i686; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_7 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/133.0.6943.33 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_7_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 10; HD1913) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.164 Mobile Safari/537.36 EdgA/131.0.2903.87",
    "Mozilla/5.0 (Linux; Android 10; Pixel 3 XL) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.164 Mobile Safari/537.36 EdgA/131.0.2903.87",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/131.0.2903.86",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
];

/// Pick a User-Agent uniformly at random from the built-in pool.
pub(crate) fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    USER_AGENTS[rng.random_range(0..USER_AGENTS.len())]
}

/// Perform one GET for `target` through `proxy`.
///
/// The request runs under `token` and the `timeout` deadline on a fresh
/// client, so neither connection reuse nor client state outlives the
/// attempt. Metric bookkeeping belongs to the caller.
pub(crate) async fn fetch_via_proxy(
    token: &CancellationToken,
    target: &str,
    proxy: &Url,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(FetchError::Transport)?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(timeout)
        .build()
        .map_err(FetchError::Transport)?;

    let request = client
        .get(target)
        .header(reqwest::header::USER_AGENT, random_user_agent());

    let response = tokio::select! {
        _ = token.cancelled() => return Err(FetchError::Cancelled),
        sent = request.send() => sent.map_err(FetchError::from_reqwest)?,
    };

    if response.status() != StatusCode::OK {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    tokio::select! {
        _ = token.cancelled() => Err(FetchError::Cancelled),
        body = response.bytes() => body.map_err(FetchError::from_reqwest),
    }
}
