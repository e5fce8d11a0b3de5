//! Configuration CLI commands: `config path`, `config show`, `config init`.

use std::path::Path;

use clap::Subcommand;
use iotnode::config::ConfigFile;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration (file values over defaults)
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(config_path: &Path, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = load_config(config_path)?;
            if !config_path.exists() {
                println!("; {} not found, showing defaults", config_path.display());
            }
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(config_path, force),
    }
}

fn run_init(config_path: &Path, force: bool) -> Result<(), CliError> {
    if config_path.exists() && !force {
        println!(
            "Config file already exists: {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }

    ConfigFile::default().save_to(config_path)?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}
