//! Restore command implementation
//!
//! Handles `bundle-slim restore`, which writes a run's mirrored originals
//! back over the tree.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::error::BundleSlimError;
use crate::fmt::{CHECKMARK, REWIND};
use crate::infra::RealFileSystem;
use crate::orchestrator::{RunDirectory, StateError};
use crate::store::BackupIndex;

/// Restore every file backed up by run `run_id` (latest when `None`)
///
/// Returns the number of files written.
///
/// # Examples
///
/// ```no_run
/// use bundle_slim::cmd::restore::cmd_restore;
///
/// let written = cmd_restore(&std::env::current_dir()?, None)?;
/// println!("{written} files restored");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn cmd_restore(project_root: &Path, run_id: Option<&str>) -> Result<usize> {
    let run = RunDirectory::open_with_fs(project_root, run_id, RealFileSystem).map_err(|e| match e {
        StateError::NotFound { run_id } => anyhow::Error::new(BundleSlimError::RunNotFound { run_id }),
        other => anyhow::Error::new(other),
    })?;

    println!(
        "{} {} Restoring run {}",
        REWIND,
        style("bundle-slim").bold(),
        style(run.run_id()).cyan()
    );

    let backups_dir = run.backups_dir();
    let index = BackupIndex::load(&backups_dir, &RealFileSystem)
        .with_context(|| format!("reading backups of run {}", run.run_id()))?;
    let restored = index
        .restore_all(project_root, &backups_dir, &RealFileSystem)
        .with_context(|| format!("restoring run {}", run.run_id()))?;

    for path in &restored {
        println!("   {} {}", style("•").dim(), path.display());
    }
    println!("{} Restored {} file(s)", CHECKMARK, restored.len());
    Ok(restored.len())
}
