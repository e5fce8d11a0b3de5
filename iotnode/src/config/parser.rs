//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::MAX_CONCURRENT_DOWNLOADS;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [node] section
    if let Some(section) = ini.section(Some("node")) {
        if let Some(v) = non_empty(section, "db_dir") {
            config.node.db_dir = expand_tilde(v);
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = non_empty(section, "directory") {
            config.cache.directory = expand_tilde(v);
        }
        if let Some(v) = section.get("max_size") {
            config.cache.max_size = parse_size(v).map_err(|_| {
                invalid(
                    "cache",
                    "max_size",
                    v,
                    "expected bytes or a value like '10MB', '2GB'",
                )
            })?;
        }
        if let Some(v) = section.get("protection_window_minutes") {
            config.cache.protection_window_minutes =
                parse_number(v, "cache", "protection_window_minutes", "minutes")?;
        }
        if let Some(v) = section.get("next_use_ttl_secs") {
            config.cache.next_use_ttl_secs =
                parse_number(v, "cache", "next_use_ttl_secs", "seconds")?;
        }
        if let Some(v) = section.get("eviction") {
            config.cache.eviction = v
                .parse()
                .map_err(|reason: String| invalid("cache", "eviction", v, &reason))?;
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = section.get("max_concurrent_downloads") {
            config.http.max_concurrent_downloads =
                parse_pool_size(v, "max_concurrent_downloads")?;
        }
        if let Some(v) = section.get("background_downloads") {
            config.http.background_downloads = parse_pool_size(v, "background_downloads")?;
        }
        if let Some(v) = section.get("timeout_secs") {
            config.http.timeout_secs = parse_positive(v, "http", "timeout_secs")?;
        }
    }

    // [prefetch] section
    if let Some(section) = ini.section(Some("prefetch")) {
        if let Some(v) = section.get("retries") {
            config.prefetch.retries = parse_positive(v, "prefetch", "retries")?;
        }
        if let Some(v) = section.get("retry_delay_secs") {
            config.prefetch.retry_delay_secs =
                parse_number(v, "prefetch", "retry_delay_secs", "seconds")?;
        }
        if let Some(v) = section.get("near_horizon_secs") {
            config.prefetch.near_horizon_secs =
                parse_number(v, "prefetch", "near_horizon_secs", "seconds")?;
        }
        if let Some(v) = section.get("near_period_secs") {
            config.prefetch.near_period_secs =
                parse_positive(v, "prefetch", "near_period_secs")?;
        }
        if let Some(v) = section.get("far_horizon_secs") {
            config.prefetch.far_horizon_secs =
                parse_number(v, "prefetch", "far_horizon_secs", "seconds")?;
        }
        if let Some(v) = section.get("far_period_secs") {
            config.prefetch.far_period_secs = parse_positive(v, "prefetch", "far_period_secs")?;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = section.get("backward_tolerance_secs") {
            config.scheduler.backward_tolerance_secs =
                parse_number(v, "scheduler", "backward_tolerance_secs", "seconds")?;
        }
        if let Some(v) = section.get("forward_tolerance_secs") {
            config.scheduler.forward_tolerance_secs =
                parse_number(v, "scheduler", "forward_tolerance_secs", "seconds")?;
        }
        if let Some(v) = section.get("max_wait_secs") {
            config.scheduler.max_wait_secs = parse_positive(v, "scheduler", "max_wait_secs")?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = Some(expand_tilde(v));
        }
    }

    if config.cache.next_use_ttl_secs > config.scheduler.max_wait_secs {
        return Err(invalid(
            "cache",
            "next_use_ttl_secs",
            &config.cache.next_use_ttl_secs.to_string(),
            "must not exceed scheduler.max_wait_secs",
        ));
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    v: &str,
    section: &str,
    key: &str,
    unit: &str,
) -> Result<T, ConfigFileError> {
    v.trim().parse().map_err(|_| {
        invalid(
            section,
            key,
            v,
            &format!("must be a non-negative integer ({unit})"),
        )
    })
}

fn parse_positive<T: FromStr + PartialOrd + Default>(
    v: &str,
    section: &str,
    key: &str,
) -> Result<T, ConfigFileError> {
    match v.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(invalid(section, key, v, "must be a positive integer")),
    }
}

fn parse_pool_size(v: &str, key: &str) -> Result<usize, ConfigFileError> {
    match v.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_CONCURRENT_DOWNLOADS).contains(&n) => Ok(n),
        _ => Err(invalid(
            "http",
            key,
            v,
            &format!("must be between 1 and {MAX_CONCURRENT_DOWNLOADS}"),
        )),
    }
}

/// Expand a leading `~` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionMode;
    use crate::config::defaults::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_overlays_present_keys() {
        let config = parse(
            "[cache]\ndirectory = /var/cache/kiosk\nmax_size = 64MB\n\
             [http]\nmax_concurrent_downloads = 4\n\
             [prefetch]\nretries = 5\nretry_delay_secs = 0\n\
             [scheduler]\nmax_wait_secs = 30\n",
        )
        .unwrap();

        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/kiosk"));
        assert_eq!(config.cache.max_size, 64 * 1024 * 1024);
        assert_eq!(config.http.max_concurrent_downloads, 4);
        assert_eq!(config.http.background_downloads, DEFAULT_BACKGROUND_DOWNLOADS);
        assert_eq!(config.prefetch.retries, 5);
        assert_eq!(config.prefetch.retry_delay_secs, 0);
        assert_eq!(config.scheduler.max_wait_secs, 30);
        assert_eq!(
            config.scheduler.backward_tolerance_secs,
            DEFAULT_BACKWARD_TOLERANCE_SECS
        );
    }

    #[test]
    fn test_empty_directory_keeps_default() {
        let config = parse("[cache]\ndirectory =\n").unwrap();
        assert_eq!(config.cache.directory, default_cache_dir());
    }

    #[test]
    fn test_invalid_size_reports_key() {
        let err = parse("[cache]\nmax_size = lots\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "cache");
                assert_eq!(key, "max_size");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_eviction_mode() {
        let config = parse("[cache]\neviction = FIFO\n").unwrap();
        assert_eq!(config.cache.eviction, EvictionMode::Fifo);

        let err = parse("[cache]\neviction = random\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "eviction"));
    }

    #[test]
    fn test_zero_retries_rejected() {
        assert!(parse("[prefetch]\nretries = 0\n").is_err());
    }

    #[test]
    fn test_pool_size_bounds() {
        assert!(parse("[http]\nbackground_downloads = 0\n").is_err());
        assert!(parse("[http]\nbackground_downloads = 1000\n").is_err());
        assert!(parse("[http]\nbackground_downloads = 2\n").is_ok());
    }

    #[test]
    fn test_ttl_must_not_exceed_max_wait() {
        assert!(parse("[cache]\nnext_use_ttl_secs = 90\n").is_err());
        assert!(parse("[cache]\nnext_use_ttl_secs = 90\n[scheduler]\nmax_wait_secs = 120\n").is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/media"), home.join("media"));
            assert_eq!(expand_tilde("~"), home);
        }
        assert_eq!(expand_tilde("/srv/media"), PathBuf::from("/srv/media"));
    }
}
