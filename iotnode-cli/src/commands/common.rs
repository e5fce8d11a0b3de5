//! Helpers shared by several commands.

use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta};
use iotnode::config::ConfigFile;
use iotnode::time::{format_timestamp, parse_timestamp};

use crate::error::CliError;

/// Load the config file; a missing file yields defaults.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(path)?)
}

/// Build a current-thread runtime for one-shot async commands.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Parse an event start time: `YYYY-MM-DD HH:MM:SS[.fff]`, `now`, or `+SECS`
/// relative to `now`.
pub fn parse_start(value: &str, now: NaiveDateTime) -> Result<NaiveDateTime, CliError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Some(offset) = value.strip_prefix('+') {
        let secs: i64 = offset.parse().map_err(|_| invalid_start(value))?;
        return Ok(now + TimeDelta::seconds(secs));
    }
    parse_timestamp(value).map_err(|_| invalid_start(value))
}

fn invalid_start(value: &str) -> CliError {
    CliError::InvalidArgument(format!(
        "Invalid start time '{}': expected 'YYYY-MM-DD HH:MM:SS', 'now' or '+SECONDS'",
        value
    ))
}

/// Timestamp as shown in listings.
pub fn show_time(value: NaiveDateTime) -> String {
    format_timestamp(value)
}
