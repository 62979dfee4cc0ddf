//! CLI command handlers
//!
//! Every handler returns the process exit code: 0 on success, 1 on error.

pub mod config;
pub mod detect;
pub mod targets;

use std::path::Path;

use gebd_model::{BoundaryConfig, BoundaryResult};

/// Load a config file (or defaults), apply `GEBD_*` overrides and validate.
pub fn resolve_config(path: Option<&Path>) -> BoundaryResult<BoundaryConfig> {
    let config = match path {
        Some(path) => BoundaryConfig::from_file(path)?,
        None => BoundaryConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}
