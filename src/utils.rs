//! Parsing helpers for proxy listings.

use url::Url;

/// Parse a newline-delimited `host:port` listing into proxy URLs for
/// `scheme`. Lines are trimmed, blank lines and unparsable hosts are
/// skipped.
pub(crate) fn parse_host_lines(scheme: &str, body: &str) -> Vec<Url> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|host| Url::parse(&format!("{scheme}://{host}")).ok())
        .collect()
}
