//! Victim selection for cache trimming.
//!
//! Pure functions over a list of candidates; no I/O. The trimmer picks a
//! [`TrimPolicy`] once per pass from the usage source's capabilities and
//! calls [`TrimPolicy::select_victim`] once per removal.

use std::fmt;
use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;
use thiserror::Error;

use super::usage::UsageCapabilities;
use crate::time;

/// No candidate may be removed under the current policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("nothing left to trim")]
pub struct NothingToTrim;

/// A removable content file with the metadata the policies look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimCandidate {
    pub key: String,
    pub size: u64,
    pub modified: SystemTime,
    pub last_use: Option<SystemTime>,
    pub next_use: Option<NaiveDateTime>,
}

impl TrimCandidate {
    pub fn new(key: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            key: key.into(),
            size,
            modified,
            last_use: None,
            next_use: None,
        }
    }

    pub fn with_last_use(mut self, last_use: Option<SystemTime>) -> Self {
        self.last_use = last_use;
        self
    }

    pub fn with_next_use(mut self, next_use: Option<NaiveDateTime>) -> Self {
        self.next_use = next_use;
        self
    }
}

/// Eviction policy for one trim pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Oldest modification time first.
    Fifo,
    /// Least recently used first.
    Lru,
    /// Content not needed soon first.
    Predictive {
        /// Content needed within this window is never removed.
        protection_window: Duration,
    },
}

impl TrimPolicy {
    /// Choose the policy the available metadata supports, preferring
    /// predictive over LRU over FIFO.
    pub fn for_capabilities(capabilities: UsageCapabilities, protection_window: Duration) -> Self {
        if capabilities.next_use {
            TrimPolicy::Predictive { protection_window }
        } else if capabilities.last_use {
            TrimPolicy::Lru
        } else {
            TrimPolicy::Fifo
        }
    }

    pub fn needs_next_use(&self) -> bool {
        matches!(self, TrimPolicy::Predictive { .. })
    }

    pub fn needs_last_use(&self) -> bool {
        matches!(self, TrimPolicy::Lru)
    }

    pub fn select_victim<'a>(
        &self,
        candidates: &'a [TrimCandidate],
        now: NaiveDateTime,
    ) -> Result<&'a TrimCandidate, NothingToTrim> {
        let victim = match self {
            TrimPolicy::Fifo => fifo_victim(candidates.iter()),
            TrimPolicy::Lru => lru_victim(candidates),
            TrimPolicy::Predictive { protection_window } => {
                predictive_victim(candidates, now, *protection_window)
            }
        };
        victim.ok_or(NothingToTrim)
    }
}

impl fmt::Display for TrimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimPolicy::Fifo => f.write_str("fifo"),
            TrimPolicy::Lru => f.write_str("lru"),
            TrimPolicy::Predictive { .. } => f.write_str("predictive"),
        }
    }
}

/// Oldest modification time; ties broken by key.
fn fifo_victim<'a>(
    candidates: impl Iterator<Item = &'a TrimCandidate>,
) -> Option<&'a TrimCandidate> {
    candidates.min_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)))
}

/// Smallest last use; content never used counts as oldest.
fn lru_victim(candidates: &[TrimCandidate]) -> Option<&TrimCandidate> {
    candidates.iter().min_by(|a, b| {
        let a_used = a.last_use.unwrap_or(SystemTime::UNIX_EPOCH);
        let b_used = b.last_use.unwrap_or(SystemTime::UNIX_EPOCH);
        a_used
            .cmp(&b_used)
            .then_with(|| a.modified.cmp(&b.modified))
            .then_with(|| a.key.cmp(&b.key))
    })
}

/// In order of preference:
/// 1. content with no scheduled use (oldest first),
/// 2. content whose last scheduled use has already passed (earliest first),
/// 3. content not needed until after the protection window (furthest first).
fn predictive_victim(
    candidates: &[TrimCandidate],
    now: NaiveDateTime,
    protection_window: Duration,
) -> Option<&TrimCandidate> {
    if let Some(victim) = fifo_victim(candidates.iter().filter(|c| c.next_use.is_none())) {
        return Some(victim);
    }

    let past = candidates
        .iter()
        .filter(|c| c.next_use.is_some_and(|t| t < now))
        .min_by(|a, b| a.next_use.cmp(&b.next_use).then_with(|| a.key.cmp(&b.key)));
    if past.is_some() {
        return past;
    }

    let cutoff = time::after(now, protection_window);
    candidates
        .iter()
        .filter(|c| c.next_use.is_some_and(|t| t > cutoff))
        .max_by(|a, b| a.next_use.cmp(&b.next_use).then_with(|| b.key.cmp(&a.key)))
}
