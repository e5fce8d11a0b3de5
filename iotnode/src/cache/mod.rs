//! Bounded on-disk media cache.
//!
//! - [`files`]: directory layout, listing and removal
//! - [`usage`]: next-use / last-use metadata sources
//! - [`policy`]: pure victim selection (FIFO, LRU, predictive)
//! - [`trim`]: cooperative trim passes

pub mod files;
pub mod policy;
pub mod trim;
pub mod usage;

pub use files::{CacheDir, CacheEntry, PARTIAL_SUFFIX};
pub use policy::{NothingToTrim, TrimCandidate, TrimPolicy};
pub use trim::{
    CacheTrimmer, PinSet, PinSource, RemovalReason, TrimConfig, TrimError, TrimReport, TrimRunner,
    TrimStep, TrimStop,
};
pub use usage::{AccessLog, EvictionMode, NoUsage, ScheduledUsage, UsageCapabilities, UsageSource};
