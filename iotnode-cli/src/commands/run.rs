//! The `run` command: start the node and keep it running until Ctrl-C.

use std::path::Path;

use iotnode::config::ConfigFile;
use iotnode::http::ReqwestFetcher;
use iotnode::logging::{init_logging, LOG_FILE};
use iotnode::node::{ContentNode, NodeConfig};
use iotnode::schedule::LogPlayback;
use tracing::info;

use super::common::load_config;
use crate::error::CliError;

/// Run the node in the foreground.
pub fn run(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    let log_dir = config.logging.resolve_directory(&config.cache);
    let _logging_guard =
        init_logging(&log_dir, LOG_FILE).map_err(|e| CliError::LoggingInit(e.to_string()))?;

    info!(
        version = iotnode::VERSION,
        config = %config_path.display(),
        "Starting iotnode"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(serve(&config))
}

async fn serve(config: &ConfigFile) -> Result<(), CliError> {
    let http = ReqwestFetcher::with_timeout(config.http_timeout())?;
    let node = ContentNode::open(http, LogPlayback, NodeConfig::from_config_file(config))?;

    node.start();
    println!("iotnode running. Press Ctrl+C to stop.");

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutdown requested");
    node.shutdown().await;

    signal.map_err(CliError::Runtime)
}
