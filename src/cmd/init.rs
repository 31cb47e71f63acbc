//! Init command implementation
//!
//! Handles `bundle-slim init`, which writes a `.bundle-slim.toml` with the
//! default settings.

use anyhow::Result;
use console::style;
use std::path::Path;

use crate::config::{ConfigFile, ConfigLoader, CONFIG_FILE_NAME};
use crate::fmt::{CHECKMARK, INFO, ROCKET, WARNING};

/// Write the default configuration into `project_root`
///
/// An existing file is left alone unless `force` is set.
///
/// # Examples
///
/// ```no_run
/// use bundle_slim::cmd::init::cmd_init;
///
/// cmd_init(&std::env::current_dir()?, false)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn cmd_init(project_root: &Path, force: bool) -> Result<()> {
    println!("{} {} Initializing", ROCKET, style("bundle-slim init").bold());
    println!();

    if ConfigLoader::exists(project_root) && !force {
        println!(
            "{} Config file already exists: {}",
            WARNING,
            style(CONFIG_FILE_NAME).cyan()
        );
        println!("   Pass --force to overwrite it.");
        return Ok(());
    }

    let config = ConfigFile::default();
    ConfigLoader::save(&config, project_root)?;

    println!("{} Created {}", CHECKMARK, style(CONFIG_FILE_NAME).cyan().bold());
    println!();
    println!("{} Defaults:", INFO);
    println!("   {} mode = {}", style("•").dim(), style(config.mode).green());
    println!(
        "   {} build.command = {}",
        style("•").dim(),
        style(&config.build.command).green()
    );
    println!(
        "   {} source-dirs = {}",
        style("•").dim(),
        style(
            config
                .source_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
        .green()
    );
    println!();
    println!("{} Next Steps:", style("💡").bold());
    println!("   1. Add a [serve] section so routes are checked after each build");
    println!(
        "   2. Run {} to preview what would be stubbed",
        style("bundle-slim optimize --dry-run").cyan()
    );
    println!("   3. Run {} to optimize", style("bundle-slim optimize").cyan());

    Ok(())
}
