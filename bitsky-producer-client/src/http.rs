//! Shared HTTP client construction.

use bitsky_producer_core::ProducerError;
use std::time::Duration;

/// Default connect timeout.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default request timeout.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a reqwest client with the timeouts both producer clients use.
pub(crate) fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client, ProducerError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(|e| ProducerError::transport(format!("failed to build HTTP client: {e}")))
}
