//! Active-download set with request coalescing.
//!
//! A key is registered for the whole life of a fetch, retries included.
//! Callers arriving while it is registered get an [`InFlight`] handle that
//! resolves to the same result as the original fetch, without a second
//! transfer.
//!
//! ```text
//! fetch(a.mp4) ─┐
//!               │   register()      one transfer
//! fetch(a.mp4) ─┼──► ActiveDownloads ──────────► finish(result)
//!               │        │                           │
//! fetch(a.mp4) ─┘        ▼                           ▼
//!                 [Joined callers receive the same result]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::debug;

use super::engine::FetchResult;

/// Counters for coalescing effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveStats {
    /// Registrations that started a transfer
    pub started: u64,
    /// Registrations that joined one already running
    pub joined: u64,
}

impl ActiveStats {
    /// Share of requests that were coalesced (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        let total = self.started + self.joined;
        if total == 0 {
            0.0
        } else {
            self.joined as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Inner {
    in_flight: HashMap<String, broadcast::Sender<FetchResult>>,
    stats: ActiveStats,
}

/// Keys currently being fetched.
#[derive(Default)]
pub struct ActiveDownloads {
    inner: Mutex<Inner>,
}

/// Outcome of registering a key.
pub enum Registration {
    /// The caller owns the fetch and must finish the guard.
    New(ActiveGuard),
    /// Another fetch is running; wait on the handle.
    Joined(InFlight),
}

impl ActiveDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `key` active, or join the fetch already running for it.
    pub fn register(self: &Arc<Self>, key: &str) -> Registration {
        let mut inner = self.lock();
        if let Some(sender) = inner.in_flight.get(key) {
            let receiver = sender.subscribe();
            inner.stats.joined += 1;
            debug!(key = key, "Joined in-flight download");
            return Registration::Joined(InFlight {
                key: key.to_string(),
                receiver,
            });
        }

        let (sender, _) = broadcast::channel(1);
        inner.in_flight.insert(key.to_string(), sender);
        inner.stats.started += 1;
        Registration::New(ActiveGuard {
            key: key.to_string(),
            active: Arc::clone(self),
            finished: false,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().in_flight.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> ActiveStats {
        self.lock().stats
    }

    fn release(&self, key: &str) -> Option<broadcast::Sender<FetchResult>> {
        self.lock().in_flight.remove(key)
    }
}

/// Ownership of an active key. Dropping it without [`finish`](Self::finish)
/// still releases the key; joined callers then observe no result.
pub struct ActiveGuard {
    key: String,
    active: Arc<ActiveDownloads>,
    finished: bool,
}

impl ActiveGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the key and hand `result` to every joined caller.
    pub fn finish(mut self, result: FetchResult) {
        self.finished = true;
        if let Some(sender) = self.active.release(&self.key) {
            // No receivers is fine: nobody joined.
            let _ = sender.send(result);
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.active.release(&self.key);
        }
    }
}

/// Handle on a fetch started by another caller.
pub struct InFlight {
    key: String,
    receiver: broadcast::Receiver<FetchResult>,
}

impl InFlight {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the original fetch to end.
    ///
    /// Returns `None` if it was abandoned without a result.
    pub async fn wait(mut self) -> Option<FetchResult> {
        self.receiver.recv().await.ok()
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadError, DownloadSummary};

    fn summary(key: &str) -> DownloadSummary {
        DownloadSummary {
            key: key.to_string(),
            bytes: 10,
            transferred: 10,
            resumed: false,
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn test_joined_caller_gets_same_result() {
        let active = Arc::new(ActiveDownloads::new());

        let Registration::New(guard) = active.register("a.mp4") else {
            panic!("first registration should start a transfer");
        };
        let Registration::Joined(waiter) = active.register("a.mp4") else {
            panic!("second registration should join");
        };
        assert!(active.contains("a.mp4"));

        guard.finish(Ok(summary("a.mp4")));

        assert_eq!(waiter.wait().await, Some(Ok(summary("a.mp4"))));
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let active = Arc::new(ActiveDownloads::new());
        let Registration::New(guard) = active.register("a.mp4") else {
            panic!("expected new");
        };
        let Registration::Joined(waiter) = active.register("a.mp4") else {
            panic!("expected joined");
        };

        guard.finish(Err(DownloadError::NotRegistered("a.mp4".into())));
        assert_eq!(
            waiter.wait().await,
            Some(Err(DownloadError::NotRegistered("a.mp4".into())))
        );
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_key() {
        let active = Arc::new(ActiveDownloads::new());
        let Registration::New(guard) = active.register("a.mp4") else {
            panic!("expected new");
        };
        let Registration::Joined(waiter) = active.register("a.mp4") else {
            panic!("expected joined");
        };

        drop(guard);
        assert!(!active.contains("a.mp4"));
        assert_eq!(waiter.wait().await, None);
        assert!(matches!(active.register("a.mp4"), Registration::New(_)));
    }

    #[test]
    fn test_stats() {
        let active = Arc::new(ActiveDownloads::new());
        let _first = active.register("a.mp4");
        let _second = active.register("a.mp4");
        let _third = active.register("b.mp4");

        let stats = active.stats();
        assert_eq!(stats.started, 2);
        assert_eq!(stats.joined, 1);
        assert!((stats.coalescing_ratio() - 1.0 / 3.0).abs() < 0.001);
        assert_eq!(active.keys(), vec!["a.mp4", "b.mp4"]);
    }
}
