//! Persisted run state under `.bundle-slim/runs/<run-id>/`

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use super::phase::PhaseResult;
use super::report::RunReport;
use crate::infra::{FileSystem, RealFileSystem};
use crate::store::{format_timestamp, BackupError};

/// Tool state directory, relative to the project root
pub const STATE_DIR: &str = ".bundle-slim";

/// Final report file name
pub const REPORT_FILE_NAME: &str = "report.json";

/// Backup mirror directory name inside a run directory
pub const BACKUPS_DIR_NAME: &str = "backups";

/// Run state failures
#[derive(Error, Debug)]
pub enum StateError {
    /// Reading or writing run state failed
    #[error("cannot access {path}: {source}")]
    Io {
        /// File or directory
        path: PathBuf,
        #[source]
        /// IO error source
        source: io::Error,
    },

    /// State file is not valid JSON for its type
    #[error("cannot encode or decode {path}: {reason}")]
    Json {
        /// File
        path: PathBuf,
        /// Serializer message
        reason: String,
    },

    /// No run with that id
    #[error("no saved run '{run_id}'")]
    NotFound {
        /// Requested id
        run_id: String,
    },

    /// Clock before the Unix epoch
    #[error(transparent)]
    Clock(#[from] BackupError),
}

/// Directory holding one run's audit trail
#[derive(Debug, Clone)]
pub struct RunDirectory<FS: FileSystem = RealFileSystem> {
    run_id: String,
    path: PathBuf,
    fs: FS,
}

/// Directory listing every run of a project
pub fn runs_root(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join("runs")
}

/// Fresh run id: sortable timestamp plus a short random suffix
pub fn new_run_id() -> Result<String, StateError> {
    let uuid = Uuid::new_v4().simple().to_string();
    Ok(format!("{}-{}", format_timestamp()?, &uuid[..8]))
}

impl RunDirectory<RealFileSystem> {
    /// Create a new run directory on disk
    pub fn create(project_root: &Path) -> Result<Self, StateError> {
        Self::create_with_fs(project_root, RealFileSystem)
    }
}

impl<FS: FileSystem> RunDirectory<FS> {
    /// Create a new run directory through `fs`
    pub fn create_with_fs(project_root: &Path, fs: FS) -> Result<Self, StateError> {
        let run_id = new_run_id()?;
        let path = runs_root(project_root).join(&run_id);
        fs.create_dir_all(&path).map_err(|e| StateError::Io {
            path: path.clone(),
            source: e,
        })?;
        log::debug!("Run directory: {}", path.display());
        Ok(Self { run_id, path, fs })
    }

    /// Open an existing run; `None` picks the latest
    pub fn open_with_fs(project_root: &Path, run_id: Option<&str>, fs: FS) -> Result<Self, StateError> {
        let root = runs_root(project_root);
        let run_id = match run_id {
            Some(id) => id.to_string(),
            None => latest_run(&root, &fs).ok_or_else(|| StateError::NotFound {
                run_id: "latest".to_string(),
            })?,
        };
        let path = root.join(&run_id);
        if !fs.is_dir(&path) {
            return Err(StateError::NotFound { run_id });
        }
        Ok(Self { run_id, path, fs })
    }

    /// Run id
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Absolute directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where backups are mirrored
    pub fn backups_dir(&self) -> PathBuf {
        self.path.join(BACKUPS_DIR_NAME)
    }

    /// Persist one phase record as `<phase>-result.json`
    pub fn write_phase(&self, result: &PhaseResult) -> Result<PathBuf, StateError> {
        self.write_json(&format!("{}-result.json", result.phase), result)
    }

    /// Persist the final report
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf, StateError> {
        self.write_json(REPORT_FILE_NAME, report)
    }

    /// Read the final report
    pub fn read_report(&self) -> Result<RunReport, StateError> {
        self.read_json(REPORT_FILE_NAME)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, StateError> {
        let path = self.path.join(name);
        let json = serde_json::to_string_pretty(value).map_err(|e| StateError::Json {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.fs.write(&path, json).map_err(|e| StateError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, StateError> {
        let path = self.path.join(name);
        let raw = self.fs.read_to_string(&path).map_err(|e| StateError::Io {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| StateError::Json {
            path,
            reason: e.to_string(),
        })
    }
}

/// Newest run id under `root`, by name
fn latest_run<FS: FileSystem>(root: &Path, fs: &FS) -> Option<String> {
    fs.list_dir(root)
        .ok()?
        .into_iter()
        .filter(|p| fs.is_dir(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .max()
}
