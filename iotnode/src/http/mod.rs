//! HTTP retrieval of media bytes.
//!
//! The download engine talks to the network only through [`HttpFetcher`],
//! which returns the status and a byte stream for a URL, optionally starting
//! at an offset. [`ReqwestFetcher`] is the production implementation.

mod client;
mod error;

pub use client::ReqwestFetcher;
pub use error::NetError;

use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;

/// Streamed response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, NetError>>;

/// Byte range requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Everything from `start` to the end of the resource.
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Response head plus streamed body.
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 206 Partial Content: the server honoured a range request.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Retrieves bytes for a URL.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// obtain a response at all are `Err`.
pub trait HttpFetcher: Send + Sync + 'static {
    fn get(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> impl Future<Output = Result<HttpResponse, NetError>> + Send;
}
