//! CnC CLI - command-line tooling for the DAQ command-and-control server
//!
//! Inspects and initialises the server configuration and checks component
//! layouts offline before they are used for a run.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::check::CheckArgs;
use commands::config::ConfigCommands;

#[derive(Parser)]
#[command(name = "cncserver")]
#[command(version = cnc::VERSION)]
#[command(about = "DAQ command-and-control server tooling", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.pdaq/cncserver.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialise the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Check a component layout's connector graph and print its start order
    Check(CheckArgs),
}

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(cnc::config::config_file_path);

    let result = match cli.command {
        Commands::Config(command) => commands::config::run(command, &config_path),
        Commands::Check(args) => commands::check::run(args, &config_path),
    };

    if let Err(e) = result {
        e.exit();
    }
}
