//! Event trigger: plays scheduled events on time, at most once each.
//!
//! One trigger runs per event store. Each wake picks the event that is due
//! (live, or imminent within the forward tolerance), removes it from the
//! store, and only then hands it to [`Playback`]. Every wake also prunes
//! events that are already in the past, so an event first observed after
//! its backward tolerance is dropped without playing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::playback::{Playback, PlaybackContent};
use crate::cache::{AccessLog, CacheDir};
use crate::config::{
    DEFAULT_BACKWARD_TOLERANCE_SECS, DEFAULT_FORWARD_TOLERANCE_SECS, DEFAULT_MAX_WAIT_SECS,
};
use crate::store::{Event, EventKind, EventStore, StoreError};
use crate::time::{distance, until, Clock};

/// Shortest sleep between wakes.
pub const MIN_WAIT: Duration = Duration::from_millis(10);

/// Trigger timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    /// An event that started less than this long ago still plays.
    pub backward_tolerance: Duration,
    /// An event starting within this long plays now.
    pub forward_tolerance: Duration,
    /// Longest sleep between wakes.
    pub max_wait: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            backward_tolerance: Duration::from_secs(DEFAULT_BACKWARD_TOLERANCE_SECS),
            forward_tolerance: Duration::from_secs(DEFAULT_FORWARD_TOLERANCE_SECS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

impl TriggerConfig {
    pub fn with_backward_tolerance(mut self, tolerance: Duration) -> Self {
        self.backward_tolerance = tolerance;
        self
    }

    pub fn with_forward_tolerance(mut self, tolerance: Duration) -> Self {
        self.forward_tolerance = tolerance;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait.max(MIN_WAIT);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Not running.
    Idle,
    /// Running, nothing playing.
    Armed,
    /// Running with a playback call outstanding.
    Firing,
}

/// The event whose playback is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEvent {
    pub eid: i64,
    pub kind: EventKind,
    pub resource: String,
    generation: u64,
}

/// What one wake did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakeReport {
    /// Event handed to playback
    pub fired: Option<Event>,
    /// Due event dropped because its media was not cached
    pub not_ready: Option<Event>,
    /// Events removed because their start had passed
    pub pruned: Vec<Event>,
    /// Sleep before the next wake
    pub next_wait: Duration,
}

/// Timer loop over one event store.
pub struct EventTrigger<P: Playback> {
    events: Arc<EventStore>,
    cache: CacheDir,
    playback: Arc<P>,
    clock: Arc<dyn Clock>,
    config: TriggerConfig,
    access: Option<Arc<AccessLog>>,
    current: Arc<Mutex<Option<CurrentEvent>>>,
    generation: AtomicU64,
    running: AtomicBool,
    retrigger: Notify,
}

impl<P: Playback> EventTrigger<P> {
    pub fn new(
        events: Arc<EventStore>,
        cache: CacheDir,
        playback: Arc<P>,
        clock: Arc<dyn Clock>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            events,
            cache,
            playback,
            clock,
            config,
            access: None,
            current: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            retrigger: Notify::new(),
        }
    }

    /// Record plays as uses for LRU eviction.
    pub fn with_access_log(mut self, access: Arc<AccessLog>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn state(&self) -> TriggerState {
        if !self.running.load(Ordering::SeqCst) {
            TriggerState::Idle
        } else if self.lock_current().is_some() {
            TriggerState::Firing
        } else {
            TriggerState::Armed
        }
    }

    pub fn current_event(&self) -> Option<CurrentEvent> {
        self.lock_current().clone()
    }

    /// Content key of the web-resource event now playing.
    pub fn current_resource(&self) -> Option<String> {
        self.lock_current()
            .as_ref()
            .filter(|c| c.kind == EventKind::WebResource)
            .map(|c| c.resource.clone())
    }

    /// Cancel the pending wait and evaluate the schedule now.
    pub fn retrigger(&self) {
        self.retrigger.notify_one();
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<CurrentEvent>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Evaluate the schedule once: fire what is due, prune what was missed.
    ///
    /// Must be called from within a Tokio runtime; playback runs as a task.
    pub fn wake(&self) -> Result<WakeReport, StoreError> {
        let now = self.clock.now();
        let mut report = WakeReport::default();

        if let Some(event) = self.due(now)? {
            // Removed before playing so a later wake can never fire it again.
            if self.events.remove(event.eid)? {
                match self.content_for(&event) {
                    Some(content) => {
                        self.start_playback(&event, content);
                        report.fired = Some(event);
                    }
                    None => {
                        warn!(
                            table = self.events.table(),
                            eid = event.eid,
                            resource = %event.resource,
                            "Media not ready, dropping event"
                        );
                        report.not_ready = Some(event);
                    }
                }
            }
        }

        report.pruned = self.events.prune(now)?;
        report.next_wait = self.next_wait(now)?;
        Ok(report)
    }

    /// The live event, else the imminent one.
    fn due(&self, now: NaiveDateTime) -> Result<Option<Event>, StoreError> {
        if let Some(event) = self.events.previous(now, None)? {
            if distance(now, event.start_time) < self.config.backward_tolerance {
                return Ok(Some(event));
            }
        }
        if let Some(event) = self.events.next(now, None)? {
            if distance(event.start_time, now) < self.config.forward_tolerance {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn next_wait(&self, now: NaiveDateTime) -> Result<Duration, StoreError> {
        let wait = self
            .events
            .next(now, None)?
            .and_then(|event| until(now, event.start_time))
            .map_or(self.config.max_wait, |d| d.min(self.config.max_wait));
        Ok(wait.max(MIN_WAIT))
    }

    fn content_for(&self, event: &Event) -> Option<PlaybackContent> {
        match event.kind {
            EventKind::Text => Some(PlaybackContent::Text(event.resource.clone())),
            EventKind::WebResource => {
                if !CacheDir::is_valid_key(&event.resource) || !self.cache.contains(&event.resource)
                {
                    return None;
                }
                if let Some(access) = &self.access {
                    access.record(&event.resource);
                }
                Some(PlaybackContent::Media(self.cache.path(&event.resource)))
            }
        }
    }

    fn start_playback(&self, event: &Event, content: PlaybackContent) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.lock_current() = Some(CurrentEvent {
            eid: event.eid,
            kind: event.kind,
            resource: event.resource.clone(),
            generation,
        });

        info!(
            table = self.events.table(),
            eid = event.eid,
            resource = %event.resource,
            duration = ?event.duration,
            "Firing event"
        );

        let playing = self.playback.play(content, event.duration);
        let current = Arc::clone(&self.current);
        let eid = event.eid;
        tokio::spawn(async move {
            match playing.await {
                Ok(()) => debug!(eid = eid, "Playback complete"),
                Err(e) => warn!(eid = eid, error = %e, "Playback failed"),
            }
            let mut current = current.lock().unwrap_or_else(|e| e.into_inner());
            if current.as_ref().is_some_and(|c| c.generation == generation) {
                *current = None;
            }
        });
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        info!(table = self.events.table(), "Event trigger started");

        loop {
            let wait = match self.wake() {
                Ok(report) => {
                    for event in &report.pruned {
                        debug!(eid = event.eid, "Pruned missed event");
                    }
                    report.next_wait
                }
                Err(e) => {
                    warn!(table = self.events.table(), error = %e, "Event trigger wake failed");
                    self.config.max_wait
                }
            };

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(table = self.events.table(), "Event trigger shutting down");
                    break;
                }

                _ = self.retrigger.notified() => {
                    debug!(table = self.events.table(), "Event trigger retriggered");
                }

                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }
}
