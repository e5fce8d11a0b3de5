//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types; conversion into the per-component
//! configuration structs lives in [`super::components`].

use std::path::PathBuf;

use crate::cache::EvictionMode;

/// Complete node configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub node: NodeSettings,
    pub cache: CacheSettings,
    pub http: HttpSettings,
    pub prefetch: PrefetchSettings,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingSettings,
}

/// `[node]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    /// Directory holding `resources.db` and `events.db`
    pub db_dir: PathBuf,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Cache directory path
    pub directory: PathBuf,
    /// Ceiling for the total size of cached files, in bytes
    pub max_size: u64,
    /// Content needed within this many minutes is never evicted by the predictive policy
    pub protection_window_minutes: u64,
    /// Memoization TTL for next-use lookups
    pub next_use_ttl_secs: u64,
    /// Which usage metadata drives eviction
    pub eviction: EvictionMode,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    /// Foreground pool capacity (near-horizon and on-demand fetches)
    pub max_concurrent_downloads: usize,
    /// Background pool capacity (far-horizon fetches)
    pub background_downloads: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// `[prefetch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchSettings {
    /// Total attempts per fetch
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub near_horizon_secs: u64,
    pub near_period_secs: u64,
    pub far_horizon_secs: u64,
    pub far_period_secs: u64,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub backward_tolerance_secs: u64,
    pub forward_tolerance_secs: u64,
    pub max_wait_secs: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log directory; `None` means `<cache directory>/log`
    pub directory: Option<PathBuf>,
}

impl LoggingSettings {
    /// Resolve the log directory against the cache directory.
    pub fn resolve_directory(&self, cache: &CacheSettings) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| cache.directory.join(super::defaults::LOG_SUBDIR))
    }
}
