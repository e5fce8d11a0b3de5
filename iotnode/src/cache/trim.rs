//! Cooperative cache trimming.
//!
//! A trim pass removes one file per step until the cache fits under the
//! ceiling. Each step runs on the blocking pool and the pass yields between
//! steps, so a long pass never stalls the schedulers. Orphaned files go
//! first, then content chosen by the pass's [`TrimPolicy`]. Assets and
//! pinned keys are never removed by policy.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::files::CacheDir;
use super::policy::{TrimCandidate, TrimPolicy};
use super::usage::UsageSource;
use crate::config::{DEFAULT_CACHE_MAX_SIZE, DEFAULT_NEXT_USE_TTL_SECS, DEFAULT_PROTECTION_WINDOW_MINUTES};
use crate::store::{ResourceStore, StoreError};
use crate::time::Clock;

/// Cache trimming configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimConfig {
    /// Ceiling for the total size of cached files.
    pub max_size: u64,
    /// Predictive policy: content needed within this window is protected.
    pub protection_window: Duration,
    /// How long a next-use lookup is reused.
    pub next_use_ttl: Duration,
}

impl TrimConfig {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            protection_window: Duration::from_secs(DEFAULT_PROTECTION_WINDOW_MINUTES * 60),
            next_use_ttl: Duration::from_secs(DEFAULT_NEXT_USE_TTL_SECS),
        }
    }

    pub fn with_protection_window(mut self, window: Duration) -> Self {
        self.protection_window = window;
        self
    }

    pub fn with_next_use_ttl(mut self, ttl: Duration) -> Self {
        self.next_use_ttl = ttl;
        self
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_SIZE)
    }
}

/// Keys that must not be removed right now (e.g. the media on screen).
pub trait PinSource: Send + Sync {
    fn current_pins(&self) -> HashSet<String>;
}

/// Explicitly pinned keys.
#[derive(Debug, Default)]
pub struct PinSet {
    keys: Mutex<HashSet<String>>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, key: &str) {
        self.lock().insert(key.to_string());
    }

    pub fn unpin(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PinSource for PinSet {
    fn current_pins(&self) -> HashSet<String> {
        self.lock().clone()
    }
}

/// Why a file was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Orphaned,
    Policy(TrimPolicy),
}

/// Result of a single trim step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimStep {
    Removed {
        key: String,
        bytes: u64,
        reason: RemovalReason,
    },
    /// The cache already fits.
    Done,
    /// Over the ceiling but nothing may be removed.
    NothingToTrim,
}

/// Why a trim pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimStop {
    UnderLimit,
    NothingToTrim,
    Cancelled,
    Failed(String),
}

/// Summary of a trim pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimReport {
    pub policy: TrimPolicy,
    pub target: u64,
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub size_before: u64,
    pub size_after: u64,
    pub stop: TrimStop,
    pub duration_ms: u64,
}

impl TrimReport {
    /// Whether the cache is known to fit under the target.
    pub fn is_within_limit(&self) -> bool {
        self.stop == TrimStop::UnderLimit
    }
}

/// Errors that abort a trim step.
#[derive(Debug, Error)]
pub enum TrimError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache file {0:?} is still present after removal")]
    NotRemoved(String),
}

/// Removes cached files until the cache fits under a ceiling.
pub struct CacheTrimmer {
    cache: CacheDir,
    resources: Arc<ResourceStore>,
    usage: Arc<dyn UsageSource>,
    pins: Arc<dyn PinSource>,
    clock: Arc<dyn Clock>,
    config: TrimConfig,
}

impl CacheTrimmer {
    pub fn new(
        cache: CacheDir,
        resources: Arc<ResourceStore>,
        usage: Arc<dyn UsageSource>,
        pins: Arc<dyn PinSource>,
        clock: Arc<dyn Clock>,
        config: TrimConfig,
    ) -> Self {
        Self {
            cache,
            resources,
            usage,
            pins,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    /// Policy the current usage source supports.
    pub fn policy(&self) -> TrimPolicy {
        TrimPolicy::for_capabilities(self.usage.capabilities(), self.config.protection_window)
    }

    /// Remove at most one file if the cache is above `target`.
    pub fn step(&self, policy: TrimPolicy, target: u64) -> Result<TrimStep, TrimError> {
        let entries = self.cache.entries()?;
        let current_size: u64 = entries.iter().map(|e| e.size).sum();
        if current_size <= target {
            return Ok(TrimStep::Done);
        }

        let pins = self.pins.current_pins();
        let now = self.clock.now();
        let mut candidates = Vec::new();

        for entry in entries.into_iter().filter(|e| !pins.contains(&e.key)) {
            let resource = self.resources.get(&entry.key)?;
            match resource {
                None => return self.remove(entry.key, RemovalReason::Orphaned),
                Some(r) if r.is_orphaned() => return self.remove(entry.key, RemovalReason::Orphaned),
                Some(r) if r.is_content() => {
                    let mut candidate = TrimCandidate::new(entry.key, entry.size, entry.modified);
                    if policy.needs_next_use() {
                        candidate.next_use = self.usage.next_use(&candidate.key, now);
                    }
                    if policy.needs_last_use() {
                        candidate.last_use = self.usage.last_use(&candidate.key);
                    }
                    candidates.push(candidate);
                }
                Some(_) => {}
            }
        }

        match policy.select_victim(&candidates, now) {
            Ok(victim) => self.remove(victim.key.clone(), RemovalReason::Policy(policy)),
            Err(_) => {
                debug!(
                    current_size = current_size,
                    target = target,
                    candidates = candidates.len(),
                    policy = %policy,
                    "Nothing to trim"
                );
                Ok(TrimStep::NothingToTrim)
            }
        }
    }

    fn remove(&self, key: String, reason: RemovalReason) -> Result<TrimStep, TrimError> {
        let bytes = self.cache.remove(&key)?;
        // A step that frees nothing must have made progress, or the pass spins.
        if bytes == 0 && self.cache.path(&key).exists() {
            return Err(TrimError::NotRemoved(key));
        }
        debug!(key = %key, bytes = bytes, reason = ?reason, "Trimmed cache file");
        Ok(TrimStep::Removed { key, bytes, reason })
    }

    /// Trim the cache down to `max_size`.
    pub async fn trim(self: &Arc<Self>, max_size: u64, cancel: &CancellationToken) -> TrimReport {
        self.trim_with_headroom(max_size, 0, cancel).await
    }

    /// Trim the cache down to `max_size - space_for`, leaving room for an
    /// incoming file of `space_for` bytes.
    pub async fn trim_with_headroom(
        self: &Arc<Self>,
        max_size: u64,
        space_for: u64,
        cancel: &CancellationToken,
    ) -> TrimReport {
        let start = Instant::now();
        let policy = self.policy();
        let target = max_size.saturating_sub(space_for);
        let size_before = self.measure().await;

        let mut files_removed = 0usize;
        let mut bytes_freed = 0u64;

        let stop = loop {
            if cancel.is_cancelled() {
                break TrimStop::Cancelled;
            }

            let this = Arc::clone(self);
            match tokio::task::spawn_blocking(move || this.step(policy, target)).await {
                Ok(Ok(TrimStep::Removed { bytes, .. })) => {
                    files_removed += 1;
                    bytes_freed += bytes;
                    tokio::task::yield_now().await;
                }
                Ok(Ok(TrimStep::Done)) => break TrimStop::UnderLimit,
                Ok(Ok(TrimStep::NothingToTrim)) => break TrimStop::NothingToTrim,
                Ok(Err(e)) => break TrimStop::Failed(e.to_string()),
                Err(e) => break TrimStop::Failed(format!("trim step panicked: {e}")),
            }
        };

        let report = TrimReport {
            policy,
            target,
            files_removed,
            bytes_freed,
            size_before,
            size_after: self.measure().await,
            stop,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        log_trim_report(&report);
        report
    }

    async fn measure(&self) -> u64 {
        let cache = self.cache.clone();
        match tokio::task::spawn_blocking(move || cache.size()).await {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to measure cache size");
                0
            }
            Err(_) => 0,
        }
    }
}

fn log_trim_report(report: &TrimReport) {
    match &report.stop {
        TrimStop::UnderLimit if report.files_removed == 0 => debug!(
            size = report.size_after,
            target = report.target,
            "Cache under limit, nothing trimmed"
        ),
        TrimStop::UnderLimit => info!(
            policy = %report.policy,
            files_removed = report.files_removed,
            bytes_freed = report.bytes_freed,
            size_before = report.size_before,
            size_after = report.size_after,
            duration_ms = report.duration_ms,
            "Cache trim complete"
        ),
        TrimStop::NothingToTrim => warn!(
            policy = %report.policy,
            files_removed = report.files_removed,
            size_after = report.size_after,
            target = report.target,
            "Cache still over limit, nothing left to trim"
        ),
        TrimStop::Cancelled => debug!(
            files_removed = report.files_removed,
            "Cache trim cancelled"
        ),
        TrimStop::Failed(error) => warn!(
            files_removed = report.files_removed,
            error = %error,
            "Cache trim failed"
        ),
    }
}

/// A pass in flight and the target it trims to.
struct ActivePass {
    id: u64,
    target: u64,
    token: CancellationToken,
}

/// Runs trim passes, at most one at a time.
///
/// An explicit pass always replaces the one in flight. A background pass
/// only replaces a pass with a looser target; while one with an equal or
/// tighter target runs it is not started. Every step re-reads the cache, so
/// the running pass also sees files added after it began.
pub struct TrimRunner {
    trimmer: Arc<CacheTrimmer>,
    current: Arc<Mutex<Option<ActivePass>>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl TrimRunner {
    pub fn new(trimmer: Arc<CacheTrimmer>, shutdown: CancellationToken) -> Self {
        Self {
            trimmer,
            current: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
            shutdown,
        }
    }

    pub fn trimmer(&self) -> &Arc<CacheTrimmer> {
        &self.trimmer
    }

    /// Register a background pass to `target` unless a pass with an equal or
    /// tighter target is still running.
    fn try_begin(&self, target: u64) -> Option<(u64, CancellationToken)> {
        let mut current = lock_active(&self.current);
        if let Some(active) = current.as_ref() {
            if active.target <= target && !active.token.is_cancelled() {
                debug!(
                    running_target = active.target,
                    target = target,
                    "Trim pass already in flight"
                );
                return None;
            }
        }
        Some(self.replace_active(&mut current, target))
    }

    /// Register a pass to `target`, cancelling whatever is in flight.
    fn begin(&self, target: u64) -> (u64, CancellationToken) {
        self.replace_active(&mut lock_active(&self.current), target)
    }

    fn replace_active(
        &self,
        current: &mut Option<ActivePass>,
        target: u64,
    ) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = self.shutdown.child_token();
        let previous = current.replace(ActivePass {
            id,
            target,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        (id, token)
    }

    /// Run a pass to `max_size - space_for` and wait for it.
    pub async fn run_pass(&self, max_size: u64, space_for: u64) -> TrimReport {
        let target = max_size.saturating_sub(space_for);
        let (id, token) = self.begin(target);
        let report = self
            .trimmer
            .trim_with_headroom(max_size, space_for, &token)
            .await;
        finish_active(&self.current, id);
        report
    }

    /// Start a background pass to the configured ceiling.
    ///
    /// Returns `None` if a pass at least as strict is already running.
    pub fn spawn_pass(&self) -> Option<JoinHandle<TrimReport>> {
        let trimmer = Arc::clone(&self.trimmer);
        let max_size = trimmer.config().max_size;
        let (id, token) = self.try_begin(max_size)?;
        let current = Arc::clone(&self.current);
        Some(tokio::spawn(async move {
            let report = trimmer.trim(max_size, &token).await;
            finish_active(&current, id);
            report
        }))
    }

    /// Cancel the pass in flight, if any.
    pub fn cancel(&self) {
        if let Some(active) = lock_active(&self.current).take() {
            active.token.cancel();
        }
    }
}

fn lock_active(current: &Mutex<Option<ActivePass>>) -> MutexGuard<'_, Option<ActivePass>> {
    current.lock().unwrap_or_else(|e| e.into_inner())
}

fn finish_active(current: &Mutex<Option<ActivePass>>, id: u64) {
    let mut current = lock_active(current);
    if current.as_ref().is_some_and(|active| active.id == id) {
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::files::tests::create_cache_file;
    use crate::cache::usage::{AccessLog, NoUsage, ScheduledUsage};
    use crate::store::{Event, EventStore, ResourceKind};
    use crate::time::ManualClock;
    use chrono::TimeDelta;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: std::path::PathBuf,
        resources: Arc<ResourceStore>,
        events: Arc<EventStore>,
        pins: Arc<PinSet>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                root: dir.path().to_path_buf(),
                _dir: dir,
                resources: Arc::new(ResourceStore::open_in_memory().unwrap()),
                events: Arc::new(EventStore::open_in_memory(1).unwrap()),
                pins: Arc::new(PinSet::new()),
                clock: Arc::new(ManualClock::starting_now()),
            }
        }

        fn content(&self, key: &str, size: usize, age_secs: u64) {
            create_cache_file(&self.root, key, size, age_secs);
            self.resources
                .insert(key, None, ResourceKind::Content)
                .unwrap();
        }

        fn asset(&self, key: &str, size: usize) {
            create_cache_file(&self.root, key, size, 10_000);
            self.resources.insert(key, None, ResourceKind::Asset).unwrap();
        }

        fn schedule(&self, eid: i64, key: &str, minutes_from_now: i64) {
            let start = self.clock.now() + TimeDelta::minutes(minutes_from_now);
            self.events
                .insert(&Event::web_resource(eid, key, start, None))
                .unwrap();
        }

        fn trimmer(&self, usage: Arc<dyn UsageSource>) -> Arc<CacheTrimmer> {
            self.trimmer_with(usage, TrimConfig::new(0))
        }

        fn trimmer_with(&self, usage: Arc<dyn UsageSource>, config: TrimConfig) -> Arc<CacheTrimmer> {
            Arc::new(CacheTrimmer::new(
                CacheDir::new(&self.root),
                Arc::clone(&self.resources),
                usage,
                Arc::clone(&self.pins) as Arc<dyn PinSource>,
                Arc::clone(&self.clock) as Arc<dyn Clock>,
                config,
            ))
        }

        fn predictive(&self) -> Arc<CacheTrimmer> {
            self.trimmer(Arc::new(ScheduledUsage::new(
                Arc::clone(&self.events),
                Duration::ZERO,
            )))
        }

        fn exists(&self, key: &str) -> bool {
            Path::new(&self.root).join(key).exists()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Single steps
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_step_done_when_under_target() {
        let fx = Fixture::new();
        fx.content("a.mp4", 100, 10);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        assert_eq!(trimmer.step(TrimPolicy::Fifo, 100).unwrap(), TrimStep::Done);
        assert!(fx.exists("a.mp4"));
    }

    #[test]
    fn test_orphan_removed_before_policy() {
        let fx = Fixture::new();
        fx.content("old.mp4", 100, 5000);
        create_cache_file(&fx.root, "stray.bin", 10, 0);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let step = trimmer.step(TrimPolicy::Fifo, 0).unwrap();

        assert_eq!(
            step,
            TrimStep::Removed {
                key: "stray.bin".to_string(),
                bytes: 10,
                reason: RemovalReason::Orphaned
            }
        );
        assert!(fx.exists("old.mp4"));
    }

    #[test]
    fn test_empty_orphan_is_removed() {
        let fx = Fixture::new();
        create_cache_file(&fx.root, "empty.bin", 0, 0);
        fx.content("a.mp4", 100, 10);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let step = trimmer.step(TrimPolicy::Fifo, 0).unwrap();

        assert!(matches!(step, TrimStep::Removed { ref key, bytes: 0, .. } if key == "empty.bin"));
        assert!(!fx.exists("empty.bin"));
    }

    #[test]
    fn test_orphaned_row_is_removed() {
        let fx = Fixture::new();
        fx.content("dropped.mp4", 100, 0);
        fx.content("kept.mp4", 100, 9000);
        fx.resources.orphan("dropped.mp4").unwrap();

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let step = trimmer.step(TrimPolicy::Fifo, 0).unwrap();

        assert!(matches!(step, TrimStep::Removed { ref key, reason: RemovalReason::Orphaned, .. } if key == "dropped.mp4"));
    }

    #[test]
    fn test_assets_and_pins_never_removed() {
        let fx = Fixture::new();
        fx.asset("logo.png", 500);
        fx.content("playing.mp4", 500, 9000);
        fx.pins.pin("playing.mp4");

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        assert_eq!(trimmer.step(TrimPolicy::Fifo, 0).unwrap(), TrimStep::NothingToTrim);

        fx.pins.unpin("playing.mp4");
        assert!(matches!(
            trimmer.step(TrimPolicy::Fifo, 0).unwrap(),
            TrimStep::Removed { ref key, .. } if key == "playing.mp4"
        ));
        assert!(fx.exists("logo.png"));
    }

    #[test]
    fn test_pinned_orphan_is_kept() {
        let fx = Fixture::new();
        create_cache_file(&fx.root, "stray.bin", 10, 0);
        fx.pins.pin("stray.bin");

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        assert_eq!(trimmer.step(TrimPolicy::Fifo, 0).unwrap(), TrimStep::NothingToTrim);
    }

    #[test]
    fn test_predictive_step_takes_unscheduled() {
        let fx = Fixture::new();
        fx.content("soon.mp4", 100, 9000);
        fx.content("later.mp4", 100, 9000);
        fx.content("never.mp4", 100, 10);
        fx.schedule(1, "soon.mp4", 5);
        fx.schedule(2, "later.mp4", 40);

        let trimmer = fx.predictive();
        let policy = trimmer.policy();
        assert!(matches!(policy, TrimPolicy::Predictive { .. }));

        let step = trimmer.step(policy, 0).unwrap();
        assert!(matches!(step, TrimStep::Removed { ref key, .. } if key == "never.mp4"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Passes
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_trim_reaches_ceiling() {
        let fx = Fixture::new();
        for (i, age) in [500u64, 400, 300, 200, 100].iter().enumerate() {
            fx.content(&format!("clip{i}.mp4"), 1000, *age);
        }

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let report = trimmer.trim(2500, &CancellationToken::new()).await;

        assert_eq!(report.stop, TrimStop::UnderLimit);
        assert_eq!(report.files_removed, 3);
        assert_eq!(report.bytes_freed, 3000);
        assert_eq!(report.size_before, 5000);
        assert_eq!(report.size_after, 2000);
        assert!(CacheDir::new(&fx.root).size().unwrap() <= 2500);
        // Oldest went first
        assert!(!fx.exists("clip0.mp4"));
        assert!(fx.exists("clip4.mp4"));
    }

    #[tokio::test]
    async fn test_trim_with_headroom() {
        let fx = Fixture::new();
        fx.content("a.mp4", 1000, 300);
        fx.content("b.mp4", 1000, 200);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let report = trimmer
            .trim_with_headroom(2000, 500, &CancellationToken::new())
            .await;

        assert_eq!(report.target, 1500);
        assert_eq!(report.files_removed, 1);
        assert!(!fx.exists("a.mp4"));
    }

    #[tokio::test]
    async fn test_trim_stops_when_protected() {
        let fx = Fixture::new();
        fx.content("soon.mp4", 1000, 100);
        fx.content("never.mp4", 1000, 100);
        fx.schedule(1, "soon.mp4", 5);

        let trimmer = fx.predictive();
        let report = trimmer.trim(500, &CancellationToken::new()).await;

        assert_eq!(report.stop, TrimStop::NothingToTrim);
        assert!(!report.is_within_limit());
        assert_eq!(report.files_removed, 1);
        assert!(fx.exists("soon.mp4"));
    }

    #[tokio::test]
    async fn test_cancelled_pass_removes_nothing() {
        let fx = Fixture::new();
        fx.content("a.mp4", 1000, 100);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = trimmer.trim(0, &cancel).await;

        assert_eq!(report.stop, TrimStop::Cancelled);
        assert!(fx.exists("a.mp4"));
    }

    #[tokio::test]
    async fn test_lru_pass_uses_access_log() {
        let fx = Fixture::new();
        fx.content("a.mp4", 1000, 9000);
        fx.content("b.mp4", 1000, 10);
        let log = Arc::new(AccessLog::new());
        log.record("a.mp4");

        let trimmer = fx.trimmer(log);
        assert_eq!(trimmer.policy(), TrimPolicy::Lru);
        trimmer.trim(1000, &CancellationToken::new()).await;

        assert!(fx.exists("a.mp4"));
        assert!(!fx.exists("b.mp4"));
    }

    #[tokio::test]
    async fn test_pass_ignores_names_that_are_not_keys() {
        let fx = Fixture::new();
        create_cache_file(&fx.root, "a\\b.mp4", 100, 0);

        let trimmer = fx.trimmer(Arc::new(NoUsage));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            trimmer.trim(0, &CancellationToken::new()),
        )
        .await
        .expect("trim pass did not finish");

        assert_eq!(report.stop, TrimStop::UnderLimit);
        assert_eq!(report.files_removed, 0);
        assert!(fx.exists("a\\b.mp4"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Runner
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_runner_supersedes_previous_pass() {
        let fx = Fixture::new();
        fx.content("a.mp4", 1000, 100);

        let runner = TrimRunner::new(fx.trimmer(Arc::new(NoUsage)), CancellationToken::new());
        let (_, first) = runner.begin(u64::MAX);
        let report = runner.run_pass(0, 0).await;

        assert!(first.is_cancelled());
        assert_eq!(report.stop, TrimStop::UnderLimit);
        assert!(!fx.exists("a.mp4"));
    }

    #[tokio::test]
    async fn test_runner_spawned_pass_uses_configured_ceiling() {
        let fx = Fixture::new();
        fx.content("a.mp4", 1000, 100);

        let runner = TrimRunner::new(fx.trimmer(Arc::new(NoUsage)), CancellationToken::new());
        let report = runner.spawn_pass().unwrap().await.unwrap();

        assert_eq!(report.target, 0);
        assert_eq!(report.files_removed, 1);
    }

    #[tokio::test]
    async fn test_background_pass_keeps_tighter_pass_running() {
        let fx = Fixture::new();
        let trimmer = fx.trimmer_with(Arc::new(NoUsage), TrimConfig::new(1_000_000));
        let runner = TrimRunner::new(trimmer, CancellationToken::new());

        let (_, explicit) = runner.begin(0);
        assert!(runner.spawn_pass().is_none());
        assert!(!explicit.is_cancelled());
    }

    #[tokio::test]
    async fn test_background_pass_replaces_looser_pass() {
        let fx = Fixture::new();
        let trimmer = fx.trimmer_with(Arc::new(NoUsage), TrimConfig::new(1_000_000));
        let runner = TrimRunner::new(trimmer, CancellationToken::new());

        let (_, loose) = runner.begin(5_000_000);
        let handle = runner.spawn_pass().expect("tighter pass should start");

        assert!(loose.is_cancelled());
        assert_eq!(handle.await.unwrap().target, 1_000_000);
    }

    #[tokio::test]
    async fn test_runner_accepts_background_pass_after_finish() {
        let fx = Fixture::new();
        let runner = TrimRunner::new(fx.trimmer(Arc::new(NoUsage)), CancellationToken::new());

        runner.run_pass(0, 0).await;
        assert!(runner.spawn_pass().is_some());
    }

    #[tokio::test]
    async fn test_explicit_pass_reaches_target_despite_background_passes() {
        let fx = Fixture::new();
        for i in 0..300 {
            fx.content(&format!("clip{i:03}.mp4"), 100, 1000 - i as u64);
        }
        let trimmer = fx.trimmer_with(Arc::new(NoUsage), TrimConfig::new(1_000_000));
        let runner = TrimRunner::new(trimmer, CancellationToken::new());

        let background = async {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(runner.spawn_pass());
            }
        };
        let (report, ()) = tokio::join!(runner.run_pass(0, 0), background);

        assert_eq!(report.stop, TrimStop::UnderLimit);
        assert_eq!(report.files_removed, 300);
        assert_eq!(CacheDir::new(&fx.root).size().unwrap(), 0);
    }
}
