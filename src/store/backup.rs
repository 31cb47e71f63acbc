//! Append-only backup of original unit content
//!
//! Every file of a unit is snapshotted before its first stub is written.
//! Restoration always writes the snapshot back, never a regenerated file.
//! The first snapshot of a unit wins: stubbing the same unit again (after a
//! restore, or in a later phase) never replaces the original with a stub.
//!
//! With a mirror directory configured, each snapshot is also written to
//! disk next to an `index.json`, so `bundle-slim restore` can undo a run
//! that was killed before it cleaned up.
//!
//! # Examples
//!
//! ```
//! use bundle_slim::store::{BackupStore, FileBackup};
//!
//! let store = BackupStore::new();
//! let first = store.snapshot("Card", vec![FileBackup::new("src/Card.jsx", "original")])?;
//! let second = store.snapshot("Card", vec![FileBackup::new("src/Card.jsx", "stub")])?;
//! assert!(first && !second);
//! assert_eq!(store.get("Card").unwrap().files[0].content, "original");
//! # Ok::<(), bundle_slim::store::BackupError>(())
//! ```

use crate::infra::{FileSystem, RealFileSystem};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Name of the mirror index file
pub const INDEX_FILE_NAME: &str = "index.json";

/// Format the current time for backup filenames and run ids
///
/// Uses simplified date arithmetic (365-day years, 30-day months). The
/// value only has to be unique and roughly sortable, not calendar exact.
///
/// Format: `YYYYMMDD_HHMMSS.mmm`, e.g. `20241102_143052.123`
///
/// # Errors
///
/// Returns [`BackupError::Clock`] if the system clock is before the Unix epoch.
pub fn format_timestamp() -> Result<String, BackupError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BackupError::Clock(e.to_string()))?;

    let secs = now.as_secs();
    let millis = now.subsec_millis();

    const SECS_PER_DAY: u64 = 86400;
    const SECS_PER_HOUR: u64 = 3600;
    const SECS_PER_MINUTE: u64 = 60;

    let days_since_epoch = secs / SECS_PER_DAY;
    let remaining = secs % SECS_PER_DAY;
    let hours = remaining / SECS_PER_HOUR;
    let remaining = remaining % SECS_PER_HOUR;
    let minutes = remaining / SECS_PER_MINUTE;
    let seconds = remaining % SECS_PER_MINUTE;

    let year = 1970 + (days_since_epoch / 365);
    let day_of_year = days_since_epoch % 365;
    let month = 1 + (day_of_year / 30).min(11);
    let day = 1 + (day_of_year % 30);

    Ok(format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}.{:03}",
        year, month, day, hours, minutes, seconds, millis
    ))
}

/// Errors that can occur during backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Failed to write the mirror copy or the index
    #[error("Failed to mirror backup to {path}: {source}")]
    Mirror {
        /// Mirror file path
        path: PathBuf,
        #[source]
        /// IO error source
        source: io::Error,
    },

    /// Index could not be serialized or parsed
    #[error("Backup index {path} is invalid: {reason}")]
    Index {
        /// Index file path
        path: PathBuf,
        /// Parse or serialization error
        reason: String,
    },

    /// System clock error while naming a backup
    #[error("System time error: {0}")]
    Clock(String),
}

/// Original content of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBackup {
    /// Project-relative path
    pub path: PathBuf,
    /// Content before the first stub was written
    pub content: String,
}

impl FileBackup {
    /// Create a file backup
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Original content of every file of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBackup {
    /// Unit identity
    pub unit: String,
    /// One entry per declaration file
    pub files: Vec<FileBackup>,
}

/// One mirrored file, as recorded in `index.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unit identity
    pub unit: String,
    /// Project-relative path of the original
    pub path: PathBuf,
    /// File name of the copy inside the backups directory
    pub backup_file: String,
}

/// Contents of `index.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIndex {
    /// Mirrored files in snapshot order
    pub entries: Vec<IndexEntry>,
}

impl BackupIndex {
    /// Read the index from a backups directory
    pub fn load<FS: FileSystem>(backups_dir: &Path, fs: &FS) -> Result<Self, BackupError> {
        let path = backups_dir.join(INDEX_FILE_NAME);
        let raw = fs.read_to_string(&path).map_err(|e| BackupError::Index {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| BackupError::Index {
            path,
            reason: e.to_string(),
        })
    }

    /// Write every mirrored original back into the project
    ///
    /// Returns the project-relative paths written.
    pub fn restore_all<FS: FileSystem>(
        &self,
        project_root: &Path,
        backups_dir: &Path,
        fs: &FS,
    ) -> Result<Vec<PathBuf>, BackupError> {
        let mut restored = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let source = backups_dir.join(&entry.backup_file);
            let content = fs.read_to_string(&source).map_err(|e| BackupError::Mirror {
                path: source.clone(),
                source: e,
            })?;
            let target = project_root.join(&entry.path);
            fs.write(&target, content)
                .map_err(|e| BackupError::Mirror { path: target, source: e })?;
            restored.push(entry.path.clone());
        }
        Ok(restored)
    }
}

/// Append-only store of unit backups
///
/// Readable from any point after a snapshot is written; the lock only
/// guards the map, never IO on the live tree.
pub struct BackupStore<FS: FileSystem = RealFileSystem> {
    entries: RwLock<BTreeMap<String, UnitBackup>>,
    index: RwLock<BackupIndex>,
    mirror_dir: Option<PathBuf>,
    fs: FS,
}

impl BackupStore<RealFileSystem> {
    /// Create an in-memory store on the real filesystem
    pub fn new() -> Self {
        Self::with_fs(RealFileSystem)
    }
}

impl Default for BackupStore<RealFileSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<FS: FileSystem> BackupStore<FS> {
    /// Create a store with a custom filesystem implementation
    pub fn with_fs(fs: FS) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            index: RwLock::new(BackupIndex::default()),
            mirror_dir: None,
            fs,
        }
    }

    /// Mirror every snapshot into `dir` as well
    pub fn with_mirror(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mirror_dir = Some(dir.into());
        self
    }

    /// Mirror directory, if any
    pub fn mirror_dir(&self) -> Option<&Path> {
        self.mirror_dir.as_deref()
    }

    /// Record the original content of a unit
    ///
    /// Returns `false` without touching anything when the unit already has
    /// a snapshot.
    pub fn snapshot(&self, unit: &str, files: Vec<FileBackup>) -> Result<bool, BackupError> {
        let mut entries = self.entries.write();
        if entries.contains_key(unit) {
            return Ok(false);
        }

        if let Some(dir) = &self.mirror_dir {
            self.mirror(dir, unit, &files)?;
        }

        entries.insert(
            unit.to_string(),
            UnitBackup {
                unit: unit.to_string(),
                files,
            },
        );
        Ok(true)
    }

    fn mirror(&self, dir: &Path, unit: &str, files: &[FileBackup]) -> Result<(), BackupError> {
        self.fs
            .create_dir_all(dir)
            .map_err(|e| BackupError::Mirror {
                path: dir.to_path_buf(),
                source: e,
            })?;

        let timestamp = format_timestamp()?;
        let mut index = self.index.write();
        for file in files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| unit.to_string());
            let uuid = Uuid::new_v4().simple().to_string();
            let backup_file = format!("{}.{}.{}.backup", name, timestamp, uuid);
            let path = dir.join(&backup_file);
            self.fs
                .write(&path, &file.content)
                .map_err(|e| BackupError::Mirror { path, source: e })?;
            index.entries.push(IndexEntry {
                unit: unit.to_string(),
                path: file.path.clone(),
                backup_file,
            });
        }

        let index_path = dir.join(INDEX_FILE_NAME);
        let json = serde_json::to_string_pretty(&*index).map_err(|e| BackupError::Index {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;
        self.fs
            .write(&index_path, json)
            .map_err(|e| BackupError::Mirror {
                path: index_path,
                source: e,
            })
    }

    /// Snapshot of a unit, if one was taken
    pub fn get(&self, unit: &str) -> Option<UnitBackup> {
        self.entries.read().get(unit).cloned()
    }

    /// Whether a unit has a snapshot
    pub fn contains(&self, unit: &str) -> bool {
        self.entries.read().contains_key(unit)
    }

    /// Number of units backed up
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// No unit backed up yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Identities with a snapshot, sorted
    pub fn units(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryFileSystem;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_format_timestamp_has_expected_shape() {
        let ts = format_timestamp().unwrap();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[8..9], "_");
        assert_eq!(&ts[15..16], ".");
    }

    #[test]
    fn test_snapshot_first_write_wins() {
        let store = BackupStore::with_fs(MemoryFileSystem::new());
        assert!(store
            .snapshot("Nav", vec![FileBackup::new("src/Nav.tsx", "v1")])
            .unwrap());
        assert!(!store
            .snapshot("Nav", vec![FileBackup::new("src/Nav.tsx", "v2")])
            .unwrap());
        assert_eq!(store.get("Nav").unwrap().files[0].content, "v1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_unit_returns_none() {
        let store = BackupStore::with_fs(MemoryFileSystem::new());
        assert!(store.get("Ghost").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_mirror_writes_copies_and_index() {
        let fs = MemoryFileSystem::new();
        let store = BackupStore::with_fs(fs.clone()).with_mirror("/run/backups");
        store
            .snapshot(
                "Chart",
                vec![
                    FileBackup::new("src/Chart.tsx", "chart"),
                    FileBackup::new("src/Chart.vue", "<template/>"),
                ],
            )
            .unwrap();

        let index = BackupIndex::load(Path::new("/run/backups"), &fs).unwrap();
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].unit, "Chart");
        assert!(index.entries[0].backup_file.starts_with("Chart.tsx."));
        let copy = fs
            .content(Path::new("/run/backups").join(&index.entries[0].backup_file))
            .unwrap();
        assert_eq!(copy, "chart");
    }

    #[test]
    fn test_mirror_failure_leaves_store_unchanged() {
        let fs = MemoryFileSystem::new();
        fs.deny_writes("/run/backups/index.json");
        let store = BackupStore::with_fs(fs).with_mirror("/run/backups");
        let result = store.snapshot("A", vec![FileBackup::new("src/A.js", "a")]);
        assert!(matches!(result, Err(BackupError::Mirror { .. })));
        assert!(!store.contains("A"));
    }

    #[test]
    fn test_restore_all_replays_index_on_real_tree() {
        let temp = TempDir::new().unwrap();
        let backups = temp.path().join(".bundle-slim/runs/r1/backups");
        let store = BackupStore::new().with_mirror(&backups);
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/A.jsx"), "// stub").unwrap();
        store
            .snapshot("A", vec![FileBackup::new("src/A.jsx", "export default function A() {}")])
            .unwrap();

        let index = BackupIndex::load(&backups, &RealFileSystem).unwrap();
        let restored = index.restore_all(temp.path(), &backups, &RealFileSystem).unwrap();
        assert_eq!(restored, vec![PathBuf::from("src/A.jsx")]);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("src/A.jsx")).unwrap(),
            "export default function A() {}"
        );
    }

    #[test]
    fn test_load_missing_index_returns_error() {
        let fs = MemoryFileSystem::new();
        let err = BackupIndex::load(Path::new("/nowhere"), &fs).unwrap_err();
        assert!(err.to_string().contains("index.json"));
    }

    #[test]
    fn test_concurrent_readers_see_snapshots() {
        let store = Arc::new(BackupStore::with_fs(MemoryFileSystem::new()));
        for i in 0..8 {
            store
                .snapshot(&format!("U{}", i), vec![FileBackup::new(format!("src/U{}.js", i), "x")])
                .unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.units().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 8);
        }
    }
}
