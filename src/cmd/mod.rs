//! Command handlers for the bundle-slim CLI
//!
//! Each submodule handles one subcommand. Handlers resolve the project root,
//! load configuration, and present results; the work itself happens in the
//! library modules.

pub mod analyze;
pub mod completions;
pub mod init;
pub mod optimize;
pub mod restore;

pub use analyze::cmd_analyze;
pub use completions::cmd_completions;
pub use init::cmd_init;
pub use optimize::{cmd_optimize, OptimizeOptions, SpinnerCollector};
pub use restore::cmd_restore;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{ConfigFile, ConfigLoader};
use crate::engine::Mode;

/// Load `.bundle-slim.toml` and apply a `--mode` override
pub(crate) fn load_config(project_root: &Path, mode: Option<&str>) -> Result<ConfigFile> {
    let mut config = ConfigLoader::load(project_root).context("loading run configuration")?;
    if let Some(mode) = mode {
        config.mode = mode.parse::<Mode>().context("loading run configuration")?;
    }
    Ok(config)
}
