//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let log_dir = config
        .logging
        .directory
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();

    format!(
        r#"[node]
; Directory for resources.db and events.db
db_dir = {}

[cache]
; Directory holding downloaded media. Files are named by their content key.
directory = {}
; Ceiling for the total size of cached media (bytes, or KB/MB/GB suffix)
max_size = {}
; Content scheduled to play within this many minutes is never evicted
protection_window_minutes = {}
; How long a computed next-use time is reused before it is looked up again
next_use_ttl_secs = {}
; Eviction order: predictive (by schedule), lru or fifo
eviction = {}

[http]
; Concurrent downloads for near-term content
max_concurrent_downloads = {}
; Concurrent downloads for content needed hours ahead
background_downloads = {}
; Request timeout in seconds
timeout_secs = {}

[prefetch]
; Download attempts per item, including the first
retries = {}
; Delay between attempts after a transient failure
retry_delay_secs = {}
; Near horizon: every near_period_secs, fetch content starting within near_horizon_secs
near_horizon_secs = {}
near_period_secs = {}
; Far horizon: every far_period_secs, fetch content starting within far_horizon_secs
far_horizon_secs = {}
far_period_secs = {}

[scheduler]
; An event that started at most this long ago still plays
backward_tolerance_secs = {}
; An event starting within this long plays early
forward_tolerance_secs = {}
; Longest sleep between schedule checks
max_wait_secs = {}

[logging]
; Log directory (default: <cache directory>/log)
directory = {}
"#,
        path_to_string(&config.node.db_dir),
        path_to_string(&config.cache.directory),
        format_size(config.cache.max_size),
        config.cache.protection_window_minutes,
        config.cache.next_use_ttl_secs,
        config.cache.eviction,
        config.http.max_concurrent_downloads,
        config.http.background_downloads,
        config.http.timeout_secs,
        config.prefetch.retries,
        config.prefetch.retry_delay_secs,
        config.prefetch.near_horizon_secs,
        config.prefetch.near_period_secs,
        config.prefetch.far_horizon_secs,
        config.prefetch.far_period_secs,
        config.scheduler.backward_tolerance_secs,
        config.scheduler.forward_tolerance_secs,
        config.scheduler.max_wait_secs,
        log_dir,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
