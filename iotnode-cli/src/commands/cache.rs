//! Cache management CLI commands.

use std::path::Path;

use clap::Subcommand;
use iotnode::cache::{CacheDir, TrimStop};
use iotnode::config::{format_size, parse_size, ConfigFile};
use iotnode::http::ReqwestFetcher;
use iotnode::node::{ContentNode, NodeConfig};
use iotnode::schedule::LogPlayback;

use super::common::{load_config, runtime};
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Trim the cache down to a size
    Trim {
        /// Target size (e.g. 500MB); defaults to cache.max_size
        #[arg(long, value_name = "SIZE")]
        max_size: Option<String>,
    },
}

/// Run a cache subcommand.
pub fn run(config_path: &Path, action: CacheAction) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    match action {
        CacheAction::Stats => run_stats(&config),
        CacheAction::Trim { max_size } => {
            let max_size = match max_size {
                Some(value) => parse_size(&value).map_err(|e| {
                    CliError::InvalidArgument(format!("Invalid --max-size '{}': {}", value, e))
                })?,
                None => config.cache.max_size,
            };
            run_trim(&config, max_size)
        }
    }
}

fn run_stats(config: &ConfigFile) -> Result<(), CliError> {
    let cache = CacheDir::new(&config.cache.directory);
    let entries = cache
        .entries()
        .map_err(|e| CliError::Cache(e.to_string()))?;
    let total: u64 = entries.iter().map(|e| e.size).sum();

    println!("Cache: {}", config.cache.directory.display());
    println!("  Files:    {}", entries.len());
    println!("  Size:     {}", format_size(total));
    println!("  Limit:    {}", format_size(config.cache.max_size));
    if config.cache.max_size > 0 {
        println!(
            "  Usage:    {:.1}%",
            total as f64 * 100.0 / config.cache.max_size as f64
        );
    }
    println!("  Eviction: {}", config.cache.eviction);
    Ok(())
}

fn run_trim(config: &ConfigFile, max_size: u64) -> Result<(), CliError> {
    runtime()?.block_on(trim(config, max_size))
}

async fn trim(config: &ConfigFile, max_size: u64) -> Result<(), CliError> {
    let node = ContentNode::open(
        ReqwestFetcher::with_timeout(config.http_timeout())?,
        LogPlayback,
        NodeConfig::from_config_file(config),
    )?;

    let report = node.trim(max_size).await;
    println!(
        "Removed {} files, freed {} ({} -> {}, policy {})",
        report.files_removed,
        format_size(report.bytes_freed),
        format_size(report.size_before),
        format_size(report.size_after),
        report.policy,
    );

    match report.stop {
        TrimStop::UnderLimit => Ok(()),
        TrimStop::NothingToTrim => {
            println!(
                "Cache is still above {}: remaining files are assets, pinned, or needed soon",
                format_size(max_size)
            );
            Ok(())
        }
        TrimStop::Cancelled => Ok(()),
        TrimStop::Failed(reason) => Err(CliError::Cache(format!("trim failed: {}", reason))),
    }
}
