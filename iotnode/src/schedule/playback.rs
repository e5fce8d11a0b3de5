//! The display side: what the trigger hands content to.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

/// What to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackContent {
    /// A cached media file.
    Media(PathBuf),
    /// Text for the marquee channel.
    Text(String),
}

impl PlaybackContent {
    pub fn is_text(&self) -> bool {
        matches!(self, PlaybackContent::Text(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback failed: {0}")]
    Failed(String),

    #[error("Playback interrupted")]
    Interrupted,
}

/// Plays content.
///
/// `play` returns immediately with a future that completes when playback of
/// this item ends. The future must not borrow the player; the trigger runs it
/// as its own task.
pub trait Playback: Send + Sync + 'static {
    fn play(
        &self,
        content: PlaybackContent,
        duration: Option<Duration>,
    ) -> impl Future<Output = Result<(), PlaybackError>> + Send + 'static;
}

/// Stand-in player that logs each item and completes after its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlayback;

impl Playback for LogPlayback {
    fn play(
        &self,
        content: PlaybackContent,
        duration: Option<Duration>,
    ) -> impl Future<Output = Result<(), PlaybackError>> + Send + 'static {
        match &content {
            PlaybackContent::Media(path) => {
                info!(path = %path.display(), duration = ?duration, "Playing media")
            }
            PlaybackContent::Text(text) => {
                info!(text = %text, duration = ?duration, "Showing marquee text")
            }
        }
        async move {
            if let Some(duration) = duration {
                tokio::time::sleep(duration).await;
            }
            Ok(())
        }
    }
}
