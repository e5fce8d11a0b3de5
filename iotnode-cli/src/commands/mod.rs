//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`cache`] - Cache statistics and trimming
//! - [`config`] - Configuration file (path, show, init)
//! - [`event`] - Scheduled events (add, list, remove)
//! - [`resource`] - Registered resources (add, orphan, list)
//! - [`run`] - Main command (run the node)

pub mod cache;
pub mod common;
pub mod config;
pub mod event;
pub mod resource;
pub mod run;
