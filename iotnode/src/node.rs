//! The content node: stores, cache, downloads and schedulers wired together.
//!
//! [`ContentNode`] is the surface the rest of the device talks to. It owns
//! two event stores, web-resource events ([`WEB_EVENTS`]) and marquee text
//! events ([`TEXT_EVENTS`]), each driven by its own [`EventTrigger`].
//!
//! ```ignore
//! let config = NodeConfig::from_config_file(&ConfigFile::load()?);
//! let node = ContentNode::open(ReqwestFetcher::new()?, LogPlayback, config)?;
//! node.start();
//! node.schedule_event(Event::web_resource(1, "intro.mp4", start, None))?;
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{
    AccessLog, CacheDir, CacheEntry, CacheTrimmer, EvictionMode, NoUsage, PinSet, PinSource,
    ScheduledUsage, TrimConfig, TrimReport, TrimRunner, UsageSource,
};
use crate::config::ConfigFile;
use crate::download::{DownloadConfig, DownloadEngine, FetchOutcome, Pool};
use crate::http::HttpFetcher;
use crate::schedule::{
    EventTrigger, Playback, PrefetchConfig, PrefetchScheduler, TriggerConfig, TriggerState,
};
use crate::store::{Event, EventKind, EventStore, Resource, ResourceKind, ResourceStore, StoreError};
use crate::time::{Clock, SystemClock};

/// Event table holding web-resource events.
pub const WEB_EVENTS: u32 = 1;

/// Event table holding marquee text events.
pub const TEXT_EVENTS: u32 = 2;

/// Everything needed to build a [`ContentNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub cache_dir: PathBuf,
    pub db_dir: PathBuf,
    pub eviction: EvictionMode,
    pub download: DownloadConfig,
    pub trim: TrimConfig,
    pub prefetch: PrefetchConfig,
    pub trigger: TriggerConfig,
}

impl NodeConfig {
    /// Defaults with explicit cache and database directories.
    pub fn new(cache_dir: impl Into<PathBuf>, db_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            db_dir: db_dir.into(),
            eviction: EvictionMode::default(),
            download: DownloadConfig::default(),
            trim: TrimConfig::default(),
            prefetch: PrefetchConfig::default(),
            trigger: TriggerConfig::default(),
        }
    }

    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            cache_dir: config.cache.directory.clone(),
            db_dir: config.node.db_dir.clone(),
            eviction: config.cache.eviction,
            download: config.download_config(),
            trim: config.trim_config(),
            prefetch: config.prefetch_config(),
            trigger: config.trigger_config(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to prepare cache directory {}: {source}", path.display())]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache I/O error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("Invalid content key: {0:?}")]
    InvalidKey(String),
}

/// Keys the trimmer must keep: explicit pins plus whatever the web trigger
/// is playing.
pub struct NodePins<P: Playback> {
    explicit: PinSet,
    trigger: Arc<EventTrigger<P>>,
}

impl<P: Playback> NodePins<P> {
    pub fn new(trigger: Arc<EventTrigger<P>>) -> Self {
        Self {
            explicit: PinSet::new(),
            trigger,
        }
    }
}

impl<P: Playback> PinSource for NodePins<P> {
    fn current_pins(&self) -> HashSet<String> {
        let mut pins = self.explicit.current_pins();
        pins.extend(self.trigger.current_resource());
        pins
    }
}

/// A running content node.
pub struct ContentNode<H: HttpFetcher, P: Playback> {
    config: NodeConfig,
    cache: CacheDir,
    resources: Arc<ResourceStore>,
    web_events: Arc<EventStore>,
    text_events: Arc<EventStore>,
    engine: Arc<DownloadEngine<H>>,
    trim: Arc<TrimRunner>,
    prefetch: Arc<PrefetchScheduler<H>>,
    web_trigger: Arc<EventTrigger<P>>,
    text_trigger: Arc<EventTrigger<P>>,
    pins: Arc<NodePins<P>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: HttpFetcher, P: Playback> ContentNode<H, P> {
    /// Open the stores and build every component. Nothing runs until
    /// [`start`](Self::start).
    pub fn open(http: H, playback: P, config: NodeConfig) -> Result<Self, NodeError> {
        Self::open_with_clock(http, playback, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        http: H,
        playback: P,
        config: NodeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let cache = CacheDir::new(&config.cache_dir);
        cache.create().map_err(|source| NodeError::CacheDirectory {
            path: config.cache_dir.clone(),
            source,
        })?;

        let resources = Arc::new(ResourceStore::open(&config.db_dir)?);
        let web_events = Arc::new(EventStore::open(&config.db_dir, WEB_EVENTS)?);
        let text_events = Arc::new(EventStore::open(&config.db_dir, TEXT_EVENTS)?);

        let shutdown = CancellationToken::new();
        let playback = Arc::new(playback);
        let access = Arc::new(AccessLog::new());

        let trigger = |events: &Arc<EventStore>| {
            Arc::new(
                EventTrigger::new(
                    Arc::clone(events),
                    cache.clone(),
                    Arc::clone(&playback),
                    Arc::clone(&clock),
                    config.trigger,
                )
                .with_access_log(Arc::clone(&access)),
            )
        };
        let web_trigger = trigger(&web_events);
        let text_trigger = trigger(&text_events);

        let pins = Arc::new(NodePins::new(Arc::clone(&web_trigger)));
        let usage: Arc<dyn UsageSource> = match config.eviction {
            EvictionMode::Predictive => Arc::new(ScheduledUsage::new(
                Arc::clone(&web_events),
                config.trim.next_use_ttl,
            )),
            EvictionMode::Lru => Arc::clone(&access) as Arc<dyn UsageSource>,
            EvictionMode::Fifo => Arc::new(NoUsage),
        };
        let trimmer = Arc::new(CacheTrimmer::new(
            cache.clone(),
            Arc::clone(&resources),
            usage,
            Arc::clone(&pins) as Arc<dyn PinSource>,
            Arc::clone(&clock),
            config.trim,
        ));
        let trim = Arc::new(TrimRunner::new(trimmer, shutdown.clone()));

        let engine = Arc::new(
            DownloadEngine::new(
                Arc::new(http),
                cache.clone(),
                Arc::clone(&resources),
                config.download.clone(),
                shutdown.clone(),
            )
            .with_trim(Arc::clone(&trim))
            .with_access_log(Arc::clone(&access)),
        );
        let prefetch = Arc::new(PrefetchScheduler::new(
            vec![Arc::clone(&web_events)],
            Arc::clone(&engine),
            clock,
            config.prefetch,
        ));

        info!(
            cache_dir = %config.cache_dir.display(),
            db_dir = %config.db_dir.display(),
            max_size = config.trim.max_size,
            eviction = %config.eviction,
            "Content node opened"
        );

        Ok(Self {
            config,
            cache,
            resources,
            web_events,
            text_events,
            engine,
            trim,
            prefetch,
            web_trigger,
            text_trigger,
            pins,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Spawn the triggers, the prefetch loops and an initial trim pass.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            warn!("Content node already started");
            return;
        }

        for trigger in [&self.web_trigger, &self.text_trigger] {
            tasks.push(tokio::spawn(
                Arc::clone(trigger).run(self.shutdown.child_token()),
            ));
        }
        tasks.extend(self.prefetch.start(&self.shutdown));
        // Detached: the pass is cancelled through the shutdown token.
        drop(self.trim.spawn_pass());

        info!("Content node started");
    }

    /// Stop every loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Node task ended abnormally");
            }
        }
        info!("Content node stopped");
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources and downloads
    // ─────────────────────────────────────────────────────────────────────────

    /// Make sure `key` is cached, downloading on the foreground pool.
    pub async fn prefetch(&self, key: &str) -> FetchOutcome {
        self.engine.fetch(key, Pool::Foreground).await
    }

    /// Register `url` as content and fetch it.
    pub async fn prefetch_url(&self, url: &str) -> FetchOutcome {
        self.engine.fetch_url(url, Pool::Foreground).await
    }

    pub fn resource(&self, key: &str) -> Result<Option<Resource>, NodeError> {
        Ok(self.resources.get(key)?)
    }

    pub fn resources(&self) -> Result<Vec<Resource>, NodeError> {
        Ok(self.resources.list()?)
    }

    pub fn insert_resource(
        &self,
        filename: &str,
        url: Option<&str>,
        kind: ResourceKind,
    ) -> Result<Resource, NodeError> {
        if !CacheDir::is_valid_key(filename) {
            return Err(NodeError::InvalidKey(filename.to_string()));
        }
        Ok(self.resources.insert(filename, url, kind)?)
    }

    /// Mark a resource for deletion by the next trim pass.
    pub fn orphan_resource(&self, filename: &str) -> Result<bool, NodeError> {
        Ok(self.resources.orphan(filename)?)
    }

    pub fn download_engine(&self) -> &Arc<DownloadEngine<H>> {
        &self.engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    pub fn event_store(&self, kind: EventKind) -> &Arc<EventStore> {
        match kind {
            EventKind::WebResource => &self.web_events,
            EventKind::Text => &self.text_events,
        }
    }

    fn trigger_for(&self, kind: EventKind) -> &Arc<EventTrigger<P>> {
        match kind {
            EventKind::WebResource => &self.web_trigger,
            EventKind::Text => &self.text_trigger,
        }
    }

    /// Insert or replace an event and re-evaluate its trigger.
    pub fn schedule_event(&self, event: Event) -> Result<(), NodeError> {
        let kind = event.kind;
        self.event_store(kind).insert(&event)?;
        self.trigger_for(kind).retrigger();
        Ok(())
    }

    pub fn cancel_event(&self, kind: EventKind, eid: i64) -> Result<bool, NodeError> {
        Ok(self.event_store(kind).remove(eid)?)
    }

    /// Evaluate both schedules immediately (e.g. after the display resumes).
    pub fn retrigger(&self) {
        self.web_trigger.retrigger();
        self.text_trigger.retrigger();
    }

    pub fn trigger_state(&self, kind: EventKind) -> TriggerState {
        self.trigger_for(kind).state()
    }

    /// Content key of the media now playing.
    pub fn now_playing(&self) -> Option<String> {
        self.web_trigger.current_resource()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache
    // ─────────────────────────────────────────────────────────────────────────

    /// Trim the cache to `max_size`, cancelling any pass in flight.
    pub async fn trim(&self, max_size: u64) -> TrimReport {
        self.trim.run_pass(max_size, 0).await
    }

    pub fn current_pins(&self) -> HashSet<String> {
        self.pins.current_pins()
    }

    pub fn pin(&self, key: &str) {
        self.pins.explicit.pin(key);
    }

    pub fn unpin(&self, key: &str) -> bool {
        self.pins.explicit.unpin(key)
    }

    pub fn cache_size(&self) -> Result<u64, NodeError> {
        Ok(self.cache.size()?)
    }

    pub fn cache_files(&self) -> Result<Vec<CacheEntry>, NodeError> {
        Ok(self.cache.entries()?)
    }

    pub fn cache_has(&self, key: &str) -> bool {
        CacheDir::is_valid_key(key) && self.cache.contains(key)
    }

    /// Delete a cached file directly; returns the bytes freed.
    pub fn cache_remove(&self, key: &str) -> Result<u64, NodeError> {
        if !CacheDir::is_valid_key(key) {
            return Err(NodeError::InvalidKey(key.to_string()));
        }
        Ok(self.cache.remove(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TrimStop;
    use crate::download::{MockFetcher, MockReply};
    use crate::schedule::RecordingPlayback;
    use crate::time::ManualClock;
    use chrono::TimeDelta;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(
        dir: &TempDir,
        replies: Vec<MockReply>,
        playback: RecordingPlayback,
    ) -> (ContentNode<MockFetcher, RecordingPlayback>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let mut config = NodeConfig::new(dir.path().join("cache"), dir.path().join("db"));
        config.download = config.download.with_retries(1);
        config.trim = TrimConfig::new(1000);
        let node = ContentNode::open_with_clock(
            MockFetcher::new(replies),
            playback,
            config,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        (node, clock)
    }

    #[tokio::test]
    async fn test_prefetch_url_then_resource_known() {
        let dir = TempDir::new().unwrap();
        let (node, _) = open(&dir, vec![MockReply::ok(b"movie")], RecordingPlayback::new());

        let outcome = node.prefetch_url("http://media.example/intro.mp4").await;

        assert!(outcome.is_ready());
        assert!(node.cache_has("intro.mp4"));
        assert_eq!(
            node.resource("intro.mp4").unwrap().unwrap().kind,
            Some(ResourceKind::Content)
        );
        assert!(matches!(node.prefetch("intro.mp4").await, FetchOutcome::Cached));
    }

    #[tokio::test]
    async fn test_schedule_event_routes_by_kind() {
        let dir = TempDir::new().unwrap();
        let (node, clock) = open(&dir, vec![], RecordingPlayback::new());
        let start = clock.now() + TimeDelta::hours(1);

        node.schedule_event(Event::web_resource(1, "a.mp4", start, None))
            .unwrap();
        node.schedule_event(Event::text(1, "Hello", start, None))
            .unwrap();

        assert_eq!(node.event_store(EventKind::WebResource).len().unwrap(), 1);
        assert_eq!(node.event_store(EventKind::Text).len().unwrap(), 1);
        assert!(node.cancel_event(EventKind::Text, 1).unwrap());
        assert!(node.event_store(EventKind::Text).is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_playing_media_is_pinned() {
        let dir = TempDir::new().unwrap();
        let playback = RecordingPlayback::holding();
        let (node, clock) = open(&dir, vec![MockReply::ok(&[0u8; 800])], playback.clone());

        node.insert_resource("a.mp4", Some("http://media.example/a.mp4"), ResourceKind::Content)
            .unwrap();
        assert!(node.prefetch("a.mp4").await.is_ready());
        node.pin("logo.png");

        node.start();
        node.schedule_event(Event::web_resource(1, "a.mp4", clock.now(), None))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(node.now_playing().as_deref(), Some("a.mp4"));
        let pins = node.current_pins();
        assert!(pins.contains("a.mp4"));
        assert!(pins.contains("logo.png"));

        let report = node.trim(0).await;
        assert_eq!(report.stop, TrimStop::NothingToTrim);
        assert!(node.cache_has("a.mp4"));

        playback.release();
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_cache_utilities() {
        let dir = TempDir::new().unwrap();
        let (node, _) = open(&dir, vec![], RecordingPlayback::new());
        std::fs::write(dir.path().join("cache").join("x.bin"), b"12345").unwrap();

        assert_eq!(node.cache_size().unwrap(), 5);
        assert_eq!(node.cache_files().unwrap().len(), 1);
        assert_eq!(node.cache_remove("x.bin").unwrap(), 5);
        assert!(!node.cache_has("x.bin"));
        assert!(matches!(node.cache_remove("../x"), Err(NodeError::InvalidKey(_))));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = ConfigFile::default();
        file.cache.eviction = EvictionMode::Lru;
        file.cache.max_size = 42;

        let config = NodeConfig::from_config_file(&file);
        assert_eq!(config.eviction, EvictionMode::Lru);
        assert_eq!(config.trim.max_size, 42);
        assert_eq!(config.cache_dir, file.cache.directory);
    }
}
