//! Download configuration.

use std::time::Duration;

use super::pool::Pool;
use crate::config::{
    DEFAULT_BACKGROUND_DOWNLOADS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
    DEFAULT_PREFETCH_RETRIES, DEFAULT_PREFETCH_RETRY_DELAY_SECS,
};

/// Settings for the download engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Total attempts per fetch, including the first.
    ///
    /// Default: 3
    pub retries: u32,

    /// Fixed delay between attempts after a transient failure.
    ///
    /// Default: 30 seconds
    pub retry_delay: Duration,

    /// Longest wait for the next body chunk before the transfer counts as
    /// stalled.
    pub read_timeout: Duration,

    /// Concurrent downloads for near-term content.
    pub foreground_slots: usize,

    /// Concurrent downloads for far-horizon prefetch.
    pub background_slots: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_PREFETCH_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_PREFETCH_RETRY_DELAY_SECS),
            read_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            foreground_slots: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            background_slots: DEFAULT_BACKGROUND_DOWNLOADS,
        }
    }
}

impl DownloadConfig {
    /// Sets the total attempt count. Zero is treated as one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_foreground_slots(mut self, slots: usize) -> Self {
        self.foreground_slots = slots.max(1);
        self
    }

    pub fn with_background_slots(mut self, slots: usize) -> Self {
        self.background_slots = slots.max(1);
        self
    }

    /// Capacity of a pool.
    pub fn slots(&self, pool: Pool) -> usize {
        match pool {
            Pool::Foreground => self.foreground_slots,
            Pool::Background => self.background_slots,
        }
    }
}
