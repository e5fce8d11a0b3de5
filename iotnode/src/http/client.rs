//! reqwest-backed fetcher.

use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use reqwest::header::RANGE;
use tracing::{debug, trace, warn};

use super::{ByteRange, HttpFetcher, HttpResponse, NetError};

const USER_AGENT: &str = concat!("iotnode/", env!("CARGO_PKG_VERSION"));

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Async HTTP fetcher using reqwest.
///
/// Only connection establishment is bounded by the timeout here; media bodies
/// can take arbitrarily long, so stalls while streaming are detected by the
/// download engine's read timeout instead.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, NetError> {
        Self::with_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeout(connect_timeout: Duration) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| NetError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, NetError> {
        trace!(url = url, range = ?range, "HTTP GET request starting");

        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await.map_err(|e| {
            warn!(
                url = url,
                error = %e,
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "HTTP request failed"
            );
            NetError::from_reqwest(e)
        })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(url = url, status = status, content_length = ?content_length, "HTTP response received");

        Ok(HttpResponse {
            status,
            content_length,
            body: response.bytes_stream().map_err(NetError::from_reqwest).boxed(),
        })
    }
}
