//! Schedule-driven behaviour: prefetching upcoming content and firing
//! events on time.

mod playback;
mod prefetch;
mod trigger;

pub use playback::{LogPlayback, Playback, PlaybackContent, PlaybackError};
pub use prefetch::{PrefetchConfig, PrefetchHorizon, PrefetchPass, PrefetchScheduler};
pub use trigger::{CurrentEvent, EventTrigger, TriggerConfig, TriggerState, WakeReport, MIN_WAIT};

#[cfg(test)]
pub(crate) use playback::tests::RecordingPlayback;
