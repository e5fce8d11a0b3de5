//! Usage metadata consulted by the eviction policies.
//!
//! A [`UsageSource`] advertises which kind of knowledge it has about cached
//! content. Knowing when content is next needed enables the predictive
//! policy; knowing when it was last used enables LRU; knowing neither falls
//! back to FIFO by modification time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tracing::warn;

use crate::store::EventStore;

/// Which usage metadata a source can provide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCapabilities {
    pub next_use: bool,
    pub last_use: bool,
}

/// Knowledge about past or future use of cached content.
pub trait UsageSource: Send + Sync {
    fn capabilities(&self) -> UsageCapabilities;

    /// When `key` is next needed, if known.
    fn next_use(&self, _key: &str, _now: NaiveDateTime) -> Option<NaiveDateTime> {
        None
    }

    /// When `key` was last used, if known.
    fn last_use(&self, _key: &str) -> Option<SystemTime> {
        None
    }
}

/// Eviction mode selected in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionMode {
    /// Evict by schedule: content needed soon is protected.
    #[default]
    Predictive,
    /// Evict the least recently used content.
    Lru,
    /// Evict the oldest file.
    Fifo,
}

impl fmt::Display for EvictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvictionMode::Predictive => "predictive",
            EvictionMode::Lru => "lru",
            EvictionMode::Fifo => "fifo",
        })
    }
}

impl FromStr for EvictionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "predictive" => Ok(EvictionMode::Predictive),
            "lru" => Ok(EvictionMode::Lru),
            "fifo" => Ok(EvictionMode::Fifo),
            other => Err(format!("unknown eviction mode '{other}'")),
        }
    }
}

/// No usage metadata at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsage;

impl UsageSource for NoUsage {
    fn capabilities(&self) -> UsageCapabilities {
        UsageCapabilities::default()
    }
}

/// Next use derived from the event schedule, memoized per key.
///
/// Expired entries are swept at most once per TTL, so keys that are no
/// longer asked about do not accumulate.
pub struct ScheduledUsage {
    events: Arc<EventStore>,
    ttl: Duration,
    memo: Mutex<Memo>,
}

struct Memo {
    entries: HashMap<String, (Instant, Option<NaiveDateTime>)>,
    swept: Instant,
}

impl Memo {
    fn sweep(&mut self, ttl: Duration) {
        if self.swept.elapsed() < ttl {
            return;
        }
        self.entries.retain(|_, (at, _)| at.elapsed() < ttl);
        self.swept = Instant::now();
    }
}

impl ScheduledUsage {
    pub fn new(events: Arc<EventStore>, ttl: Duration) -> Self {
        Self {
            events,
            ttl,
            memo: Mutex::new(Memo {
                entries: HashMap::new(),
                swept: Instant::now(),
            }),
        }
    }

    fn lookup(&self, key: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.events.next_use(key, now) {
            Ok(next) => next,
            Err(e) => {
                // Unknown schedule: treat as needed now so it stays protected.
                warn!(key = key, error = %e, "Failed to look up next use");
                Some(now)
            }
        }
    }
}

impl UsageSource for ScheduledUsage {
    fn capabilities(&self) -> UsageCapabilities {
        UsageCapabilities {
            next_use: true,
            last_use: false,
        }
    }

    fn next_use(&self, key: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, value)) = memo.entries.get(key) {
            if at.elapsed() < self.ttl {
                return *value;
            }
        }
        memo.sweep(self.ttl);
        let value = self.lookup(key, now);
        memo.entries.insert(key.to_string(), (Instant::now(), value));
        value
    }
}

/// In-memory record of when each key was last played or fetched.
///
/// Ephemeral: starts empty on every run, so content never touched since
/// startup counts as least recently used.
#[derive(Debug, Default)]
pub struct AccessLog {
    entries: DashMap<String, SystemTime>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str) {
        self.record_at(key, SystemTime::now());
    }

    pub fn record_at(&self, key: &str, at: SystemTime) {
        self.entries.insert(key.to_string(), at);
    }

    pub fn forget(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UsageSource for AccessLog {
    fn capabilities(&self) -> UsageCapabilities {
        UsageCapabilities {
            next_use: false,
            last_use: true,
        }
    }

    fn last_use(&self, key: &str) -> Option<SystemTime> {
        self.entries.get(key).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Event;
    use chrono::{NaiveDate, TimeDelta};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("LRU".parse::<EvictionMode>(), Ok(EvictionMode::Lru));
        assert_eq!(" fifo ".parse::<EvictionMode>(), Ok(EvictionMode::Fifo));
        assert_eq!(
            EvictionMode::Predictive.to_string().parse::<EvictionMode>(),
            Ok(EvictionMode::Predictive)
        );
        assert!("random".parse::<EvictionMode>().is_err());
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(NoUsage.capabilities(), UsageCapabilities::default());
        assert!(AccessLog::new().capabilities().last_use);
        let events = Arc::new(EventStore::open_in_memory(1).unwrap());
        assert!(ScheduledUsage::new(events, Duration::from_secs(3))
            .capabilities()
            .next_use);
    }

    #[test]
    fn test_scheduled_usage_is_memoized() {
        let events = Arc::new(EventStore::open_in_memory(1).unwrap());
        let usage = ScheduledUsage::new(Arc::clone(&events), Duration::from_secs(60));

        assert_eq!(usage.next_use("a.mp4", t0()), None);

        let start = t0() + TimeDelta::minutes(5);
        events
            .insert(&Event::web_resource(1, "a.mp4", start, None))
            .unwrap();

        // Still the memoized answer
        assert_eq!(usage.next_use("a.mp4", t0()), None);

        let fresh = ScheduledUsage::new(events, Duration::ZERO);
        assert_eq!(fresh.next_use("a.mp4", t0()), Some(start));
    }

    #[test]
    fn test_scheduled_usage_drops_expired_entries() {
        let events = Arc::new(EventStore::open_in_memory(1).unwrap());
        let usage = ScheduledUsage::new(events, Duration::ZERO);

        for i in 0..50 {
            usage.next_use(&format!("clip{i}.mp4"), t0());
        }

        assert_eq!(usage.memo.lock().unwrap().entries.len(), 1);
    }

    #[test]
    fn test_access_log() {
        let log = AccessLog::new();
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);

        assert_eq!(log.last_use("a.mp4"), None);
        log.record_at("a.mp4", at);
        assert_eq!(log.last_use("a.mp4"), Some(at));
        assert_eq!(log.len(), 1);

        log.forget("a.mp4");
        assert!(log.is_empty());
    }
}
