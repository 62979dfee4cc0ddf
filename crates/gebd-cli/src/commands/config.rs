//! `gebd config` commands
//!
//! - `config check <file>`: load, apply `GEBD_*` overrides, validate

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::{error, info};

use gebd_model::BoundaryConfig;

use super::resolve_config;

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Check(CheckArgs),
}

/// Arguments for `config check`.
#[derive(Args)]
pub struct CheckArgs {
    /// TOML configuration file
    pub file: PathBuf,
}

/// Handle config subcommands.
pub fn handle_config_command(cmd: ConfigCommands) -> i32 {
    match cmd {
        ConfigCommands::Check(args) => handle_check(args),
    }
}

fn handle_check(args: CheckArgs) -> i32 {
    match resolve_config(Some(args.file.as_path())) {
        Ok(config) => {
            print!("{}", format_summary(&config));
            info!(file = %args.file.display(), "Configuration is valid");
            0
        }
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn format_summary(config: &BoundaryConfig) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let m = &config.model;
    let _ = writeln!(out, "Configuration OK");
    let _ = writeln!(
        out,
        "  model: dim={} group={} k={} gop={} similarity={} fcn_kernel={} gru_layers={}",
        m.dim, m.group, m.window_half_size, m.gop_size, m.similarity, m.fcn_kernel, m.gru_layers
    );
    let _ = writeln!(
        out,
        "  training: sigma={} lr={} weight_decay={}",
        config.training.sigma, config.training.learning_rate, config.training.weight_decay
    );
    let _ = writeln!(out, "  device: prefer_cuda={}", config.device.prefer_cuda);
    out
}
