//! iotnode - content delivery core for kiosk and signage devices
//!
//! Keeps a bounded on-disk cache of media, downloads it ahead of time from a
//! schedule, and fires scheduled events at playback on time.
//!
//! # High-Level API
//!
//! The [`node`] module wires everything together:
//!
//! ```ignore
//! use iotnode::config::ConfigFile;
//! use iotnode::http::ReqwestFetcher;
//! use iotnode::node::{ContentNode, NodeConfig};
//! use iotnode::schedule::LogPlayback;
//!
//! let config = NodeConfig::from_config_file(&ConfigFile::load()?);
//! let node = ContentNode::open(ReqwestFetcher::new()?, LogPlayback, config)?;
//! node.start();
//! ```
//!
//! # Modules
//!
//! - [`store`]: SQLite resource and event tables
//! - [`http`]: the network seam
//! - [`download`]: resumable, coalesced, retried downloads
//! - [`cache`]: cache layout and cooperative trimming
//! - [`schedule`]: prefetch loops and the event trigger

pub mod cache;
pub mod config;
pub mod download;
pub mod http;
pub mod logging;
pub mod node;
pub mod schedule;
pub mod store;
pub mod time;

/// Version of the library and CLI, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
