//! iotnode CLI - run and administer a content node.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::event::EventAction;
use commands::resource::ResourceAction;

#[derive(Parser)]
#[command(name = "iotnode")]
#[command(version = iotnode::VERSION)]
#[command(about = "Content cache, prefetch and event scheduling for signage devices", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/iotnode/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node until interrupted
    Run,

    /// Manage registered resources
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Manage scheduled events
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Inspect or trim the media cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(iotnode::config::config_file_path);

    let result = match cli.command {
        Commands::Run => commands::run::run(&config_path),
        Commands::Resource { action } => commands::resource::run(&config_path, action),
        Commands::Event { action } => commands::event::run(&config_path, action),
        Commands::Cache { action } => commands::cache::run(&config_path, action),
        Commands::Config { command } => commands::config::run(&config_path, command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
