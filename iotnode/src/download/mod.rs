//! Fetching media into the cache.
//!
//! [`DownloadEngine`] resolves a key through the resource store, draws a slot
//! from the foreground or background [`Pool`], and streams the body into the
//! cache with resume and retry. Concurrent fetches of one key are coalesced
//! through [`ActiveDownloads`].

mod active;
mod config;
mod engine;
mod error;
mod pool;

pub use active::{ActiveDownloads, ActiveGuard, ActiveStats, InFlight, Registration};
pub use config::DownloadConfig;
pub use engine::{DownloadEngine, DownloadSummary, FetchOutcome, FetchResult};
pub use error::{is_transient_status, DownloadError};
pub use pool::{DownloadPools, Pool};

#[cfg(test)]
pub(crate) use engine::tests::{MockFetcher, MockReply};
