//! Default values for every configuration setting.
//!
//! All `DEFAULT_*` constants live here together with the
//! `ConfigFile::default()` implementation.

use std::path::PathBuf;

use super::settings::*;
use crate::cache::EvictionMode;

/// Application directory name under the platform config/data/cache roots.
pub const APP_DIR_NAME: &str = "iotnode";

// =============================================================================
// Cache
// =============================================================================

/// Cache ceiling in bytes.
pub const DEFAULT_CACHE_MAX_SIZE: u64 = 10_000_000;

/// Predictive eviction leaves content needed within this window alone.
pub const DEFAULT_PROTECTION_WINDOW_MINUTES: u64 = 20;

/// How long a computed next-use time stays valid.
pub const DEFAULT_NEXT_USE_TTL_SECS: u64 = 3;

/// Subdirectory of the cache directory holding log files.
pub const LOG_SUBDIR: &str = "log";

// =============================================================================
// HTTP
// =============================================================================

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 1;
pub const DEFAULT_BACKGROUND_DOWNLOADS: usize = 1;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Upper bound accepted for either download pool.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 64;

// =============================================================================
// Prefetch
// =============================================================================

/// Total download attempts per fetch, including the first.
pub const DEFAULT_PREFETCH_RETRIES: u32 = 3;
pub const DEFAULT_PREFETCH_RETRY_DELAY_SECS: u64 = 30;

pub const DEFAULT_NEAR_HORIZON_SECS: u64 = 20 * 60;
pub const DEFAULT_NEAR_PERIOD_SECS: u64 = 10 * 60;
pub const DEFAULT_FAR_HORIZON_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_FAR_PERIOD_SECS: u64 = 60 * 60;

// =============================================================================
// Scheduler
// =============================================================================

/// An event that started less than this long ago is still live.
pub const DEFAULT_BACKWARD_TOLERANCE_SECS: u64 = 5;
/// An event starting within this long is imminent and fires early.
pub const DEFAULT_FORWARD_TOLERANCE_SECS: u64 = 3;
/// Longest sleep between scheduler wakes.
pub const DEFAULT_MAX_WAIT_SECS: u64 = 60;

// =============================================================================
// Paths
// =============================================================================

/// Default cache directory (`~/.cache/iotnode` on Linux).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default database directory (`~/.local/share/iotnode` on Linux).
pub fn default_db_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                db_dir: default_db_dir(),
            },
            cache: CacheSettings {
                directory: default_cache_dir(),
                max_size: DEFAULT_CACHE_MAX_SIZE,
                protection_window_minutes: DEFAULT_PROTECTION_WINDOW_MINUTES,
                next_use_ttl_secs: DEFAULT_NEXT_USE_TTL_SECS,
                eviction: EvictionMode::default(),
            },
            http: HttpSettings {
                max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
                background_downloads: DEFAULT_BACKGROUND_DOWNLOADS,
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            },
            prefetch: PrefetchSettings {
                retries: DEFAULT_PREFETCH_RETRIES,
                retry_delay_secs: DEFAULT_PREFETCH_RETRY_DELAY_SECS,
                near_horizon_secs: DEFAULT_NEAR_HORIZON_SECS,
                near_period_secs: DEFAULT_NEAR_PERIOD_SECS,
                far_horizon_secs: DEFAULT_FAR_HORIZON_SECS,
                far_period_secs: DEFAULT_FAR_PERIOD_SECS,
            },
            scheduler: SchedulerSettings {
                backward_tolerance_secs: DEFAULT_BACKWARD_TOLERANCE_SECS,
                forward_tolerance_secs: DEFAULT_FORWARD_TOLERANCE_SECS,
                max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            },
            logging: LoggingSettings { directory: None },
        }
    }
}
