//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use iotnode::config::ConfigFileError;
use iotnode::http::NetError;
use iotnode::node::NodeError;
use iotnode::store::StoreError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or written
    Config(ConfigFileError),
    /// Failed to build the HTTP client
    Http(NetError),
    /// Failed to open or use the content node
    Node(NodeError),
    /// Resource or event store error
    Store(StoreError),
    /// Failed to start the async runtime or install the signal handler
    Runtime(std::io::Error),
    /// A cache operation did not complete
    Cache(String),
    /// A command-line value could not be used
    InvalidArgument(String),
    /// A named resource or event does not exist
    NotFound(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigFileError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!("Fix the value in the config file, or regenerate it with:");
            eprintln!("  iotnode config init --force");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Http(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Node(e) => write!(f, "{}", e),
            CliError::Store(e) => write!(f, "Database error: {}", e),
            CliError::Runtime(e) => write!(f, "Runtime error: {}", e),
            CliError::Cache(msg) => write!(f, "Cache error: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Node(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<NodeError> for CliError {
    fn from(e: NodeError) -> Self {
        CliError::Node(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<NetError> for CliError {
    fn from(e: NetError) -> Self {
        CliError::Http(e)
    }
}
