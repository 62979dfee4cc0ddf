//! gebd CLI
//!
//! Command-line front end for boundary detection on compressed video.
//!
//! # Commands
//!
//! - `detect`: score every frame of a clip stored as safetensors
//! - `targets`: print Gaussian-smoothed training targets for a label row
//! - `config check`: validate a TOML configuration file
//!
//! Exit code 0 on success, 1 on error. Logs go to stderr (`RUST_LOG` or
//! `-v` flags); results go to stdout.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// Generic event boundary detection over codec side data
#[derive(Parser)]
#[command(name = "gebd")]
#[command(version)]
#[command(about = "Generic event boundary detection over compressed-video side data")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every frame of a clip
    Detect(commands::detect::DetectArgs),
    /// Print smoothed boundary targets
    Targets(commands::targets::TargetsArgs),
    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Detect(args) => commands::detect::handle_detect(args),
        Commands::Targets(args) => commands::targets::handle_targets(args),
        Commands::Config { action } => commands::config::handle_config_command(action),
    };

    std::process::exit(exit_code);
}
