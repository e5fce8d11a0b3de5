use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::http::NetError;

/// Why a fetch failed.
///
/// Cloneable so every caller waiting on a coalesced fetch sees the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("No URL registered for {0}")]
    NotRegistered(String),

    #[error("Request for {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Server rejected resume of {url} at byte {offset} (HTTP {status})")]
    ResumeRejected { url: String, offset: u64, status: u16 },

    #[error("Transfer from {url} stalled for {after:?}")]
    Stalled { url: String, after: Duration },

    #[error("Cache I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Resource store error: {0}")]
    Store(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Network { source, .. } => source.is_transient(),
            DownloadError::Status { status, .. } => is_transient_status(*status),
            DownloadError::Stalled { .. } => true,
            _ => false,
        }
    }
}

/// 5xx, 408 Request Timeout and 429 Too Many Requests.
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}
