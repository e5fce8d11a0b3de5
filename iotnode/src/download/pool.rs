//! Foreground and background download slots.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use super::config::DownloadConfig;

/// Which slot pool a download draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    /// Content needed soon.
    Foreground,
    /// Far-horizon prefetch.
    Background,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pool::Foreground => "foreground",
            Pool::Background => "background",
        })
    }
}

/// Two independent counting semaphores bounding concurrent transfers.
#[derive(Debug, Clone)]
pub struct DownloadPools {
    foreground: Arc<Semaphore>,
    background: Arc<Semaphore>,
}

impl DownloadPools {
    pub fn new(foreground: usize, background: usize) -> Self {
        Self {
            foreground: Arc::new(Semaphore::new(foreground.max(1))),
            background: Arc::new(Semaphore::new(background.max(1))),
        }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(config.foreground_slots, config.background_slots)
    }

    fn semaphore(&self, pool: Pool) -> &Arc<Semaphore> {
        match pool {
            Pool::Foreground => &self.foreground,
            Pool::Background => &self.background,
        }
    }

    /// Wait for a slot in `pool`.
    pub async fn acquire(&self, pool: Pool) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(self.semaphore(pool)).acquire_owned().await
    }

    /// Free slots in `pool`.
    pub fn available(&self, pool: Pool) -> usize {
        self.semaphore(pool).available_permits()
    }
}
