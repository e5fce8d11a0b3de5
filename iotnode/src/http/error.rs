use thiserror::Error;

/// Failure to obtain or read an HTTP response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl NetError {
    /// Classify a reqwest error.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            Self::Body(error.to_string())
        } else if error.is_builder() {
            Self::Client(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, NetError::Client(_))
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        Self::from_reqwest(error)
    }
}
