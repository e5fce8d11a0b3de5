//! Node configuration.
//!
//! The INI file is parsed into a [`ConfigFile`] of per-section settings, which
//! then hands each component its own configuration struct
//! ([`ConfigFile::download_config`], [`ConfigFile::trim_config`], ...).

mod components;
mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::*;
pub use size::{format_size, parse_size, SizeParseError};
