//! Periodic prefetch of scheduled content.
//!
//! Two loops scan the schedule: a near horizon on the foreground pool and a
//! far horizon on the background pool. A pass spawns fetches and returns
//! without waiting for them; fetching a key that is cached or already in
//! flight is a no-op, so passes may overlap freely.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_FAR_HORIZON_SECS, DEFAULT_FAR_PERIOD_SECS, DEFAULT_NEAR_HORIZON_SECS,
    DEFAULT_NEAR_PERIOD_SECS,
};
use crate::download::{DownloadEngine, FetchOutcome, Pool};
use crate::http::HttpFetcher;
use crate::store::{EventKind, EventStore, StoreError};
use crate::time::{self, Clock};

/// One prefetch loop: how far ahead to look, how often, and on which pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchHorizon {
    pub name: &'static str,
    pub horizon: Duration,
    pub period: Duration,
    pub pool: Pool,
}

impl PrefetchHorizon {
    pub fn near(horizon: Duration, period: Duration) -> Self {
        Self {
            name: "near",
            horizon,
            period,
            pool: Pool::Foreground,
        }
    }

    pub fn far(horizon: Duration, period: Duration) -> Self {
        Self {
            name: "far",
            horizon,
            period,
            pool: Pool::Background,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub near: PrefetchHorizon,
    pub far: PrefetchHorizon,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            near: PrefetchHorizon::near(
                Duration::from_secs(DEFAULT_NEAR_HORIZON_SECS),
                Duration::from_secs(DEFAULT_NEAR_PERIOD_SECS),
            ),
            far: PrefetchHorizon::far(
                Duration::from_secs(DEFAULT_FAR_HORIZON_SECS),
                Duration::from_secs(DEFAULT_FAR_PERIOD_SECS),
            ),
        }
    }
}

/// Result of a single scan.
#[derive(Debug, Default)]
pub struct PrefetchPass {
    /// Events inside the horizon
    pub scanned: usize,
    /// Distinct keys a fetch was requested for, in start order
    pub requested: Vec<String>,
    /// Spawned fetches; dropping them does not cancel the fetch
    pub handles: Vec<JoinHandle<FetchOutcome>>,
}

/// Scans event stores and requests fetches for upcoming content.
pub struct PrefetchScheduler<H: HttpFetcher> {
    events: Vec<Arc<EventStore>>,
    engine: Arc<DownloadEngine<H>>,
    clock: Arc<dyn Clock>,
    config: PrefetchConfig,
}

impl<H: HttpFetcher> PrefetchScheduler<H> {
    pub fn new(
        events: Vec<Arc<EventStore>>,
        engine: Arc<DownloadEngine<H>>,
        clock: Arc<dyn Clock>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            events,
            engine,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Scan once and spawn a fetch for each distinct web resource starting
    /// within the horizon.
    pub fn pass(&self, horizon: &PrefetchHorizon) -> Result<PrefetchPass, StoreError> {
        let limit = time::after(self.clock.now(), horizon.horizon);
        let mut seen = HashSet::new();
        let mut pass = PrefetchPass::default();

        for store in &self.events {
            for event in store.until(limit)? {
                pass.scanned += 1;
                if event.kind != EventKind::WebResource || !seen.insert(event.resource.clone()) {
                    continue;
                }

                let engine = Arc::clone(&self.engine);
                let key = event.resource.clone();
                let pool = horizon.pool;
                pass.handles.push(tokio::spawn(async move {
                    engine.fetch(&key, pool).await
                }));
                pass.requested.push(event.resource);
            }
        }

        debug!(
            horizon = horizon.name,
            scanned = pass.scanned,
            requested = pass.requested.len(),
            "Prefetch pass"
        );
        Ok(pass)
    }

    /// Run one horizon's loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, horizon: PrefetchHorizon, shutdown: CancellationToken) {
        info!(
            horizon = horizon.name,
            horizon_secs = horizon.horizon.as_secs(),
            period_secs = horizon.period.as_secs(),
            pool = %horizon.pool,
            "Prefetch scheduler started"
        );

        loop {
            if let Err(e) = self.pass(&horizon) {
                warn!(horizon = horizon.name, error = %e, "Prefetch pass failed");
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(horizon = horizon.name, "Prefetch scheduler shutting down");
                    break;
                }

                _ = tokio::time::sleep(horizon.period) => {}
            }
        }
    }

    /// Spawn the near and far loops.
    pub fn start(self: &Arc<Self>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        [self.config.near, self.config.far]
            .into_iter()
            .map(|horizon| tokio::spawn(Arc::clone(self).run(horizon, shutdown.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheDir;
    use crate::download::{DownloadConfig, MockFetcher, MockReply};
    use crate::store::{Event, ResourceKind, ResourceStore};
    use crate::time::ManualClock;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: CacheDir,
        resources: Arc<ResourceStore>,
        events: Arc<EventStore>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                cache: CacheDir::new(dir.path()),
                _dir: dir,
                resources: Arc::new(ResourceStore::open_in_memory().unwrap()),
                events: Arc::new(EventStore::open_in_memory(1).unwrap()),
                clock: Arc::new(ManualClock::starting_now()),
            }
        }

        fn schedule(&self, eid: i64, key: &str, offset_secs: i64) {
            self.resources
                .insert(
                    key,
                    Some(&format!("http://media.example/{key}")),
                    ResourceKind::Content,
                )
                .unwrap();
            let start = self.clock.now() + TimeDelta::seconds(offset_secs);
            self.events
                .insert(&Event::web_resource(eid, key, start, None))
                .unwrap();
        }

        fn scheduler(&self, replies: Vec<MockReply>) -> PrefetchScheduler<MockFetcher> {
            let engine = DownloadEngine::new(
                Arc::new(MockFetcher::new(replies)),
                self.cache.clone(),
                Arc::clone(&self.resources),
                DownloadConfig::default().with_retries(1),
                CancellationToken::new(),
            );
            PrefetchScheduler::new(
                vec![Arc::clone(&self.events)],
                Arc::new(engine),
                Arc::clone(&self.clock) as Arc<dyn Clock>,
                PrefetchConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_pass_stops_at_horizon() {
        let fx = Fixture::new();
        fx.schedule(1, "soon.mp4", 60);
        fx.schedule(2, "later.mp4", 1100);
        fx.schedule(3, "tomorrow.mp4", 2000);
        let scheduler = fx.scheduler(vec![MockReply::ok(b"a"), MockReply::ok(b"b")]);

        let pass = scheduler.pass(&scheduler.config().near).unwrap();

        assert_eq!(pass.scanned, 2);
        assert_eq!(pass.requested, vec!["soon.mp4", "later.mp4"]);
        for handle in pass.handles {
            assert!(handle.await.unwrap().is_ready());
        }
        assert!(fx.cache.contains("soon.mp4"));
        assert!(!fx.cache.contains("tomorrow.mp4"));
    }

    #[tokio::test]
    async fn test_far_pass_uses_background_pool() {
        let fx = Fixture::new();
        fx.schedule(1, "tomorrow.mp4", 5 * 3600);
        let scheduler = fx.scheduler(vec![MockReply::ok(b"a")]);

        let far = scheduler.config().far;
        assert_eq!(far.pool, Pool::Background);

        let pass = scheduler.pass(&far).unwrap();
        assert_eq!(pass.requested, vec!["tomorrow.mp4"]);
    }

    #[tokio::test]
    async fn test_repeated_key_requested_once() {
        let fx = Fixture::new();
        fx.schedule(1, "loop.mp4", 60);
        fx.schedule(2, "loop.mp4", 120);
        let scheduler = fx.scheduler(vec![MockReply::ok(b"a")]);

        let pass = scheduler.pass(&scheduler.config().near).unwrap();
        assert_eq!(pass.scanned, 2);
        assert_eq!(pass.requested, vec!["loop.mp4"]);
    }

    #[tokio::test]
    async fn test_text_events_skipped() {
        let fx = Fixture::new();
        let start = fx.clock.now() + TimeDelta::seconds(30);
        fx.events
            .insert(&Event::text(1, "Welcome", start, None))
            .unwrap();
        let scheduler = fx.scheduler(vec![]);

        let pass = scheduler.pass(&scheduler.config().near).unwrap();
        assert_eq!(pass.scanned, 1);
        assert!(pass.requested.is_empty());
    }

    #[tokio::test]
    async fn test_loops_stop_on_shutdown() {
        let fx = Fixture::new();
        let scheduler = Arc::new(fx.scheduler(vec![]));
        let shutdown = CancellationToken::new();

        let handles = scheduler.start(&shutdown);
        assert_eq!(handles.len(), 2);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
