//! The live source tree, seen as a set of removable units
//!
//! [`WorkingTree`] is the only place that writes stubs and restores
//! originals. Each `*_batch` call is one mutation batch: the engines issue
//! at most one batch before every probe.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::backup::{BackupError, BackupStore, FileBackup};
use crate::classifier::UsageGraph;
use crate::engine::stub::{generate_stub, is_stub, StubError};
use crate::infra::{FileSystem, RealFileSystem};

/// Failure while replacing a unit with its stub
#[derive(Error, Debug)]
pub enum TreeError {
    /// Unit is not a known component
    #[error("Unknown unit: {unit}")]
    UnknownUnit {
        /// Unit identity
        unit: String,
    },

    /// Stub could not be generated
    #[error(transparent)]
    Stub(#[from] StubError),

    /// Snapshot could not be recorded
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Reading or writing a unit file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Project-relative path
        path: PathBuf,
        #[source]
        /// IO error source
        source: io::Error,
    },
}

/// Failure while writing a unit's original content back
#[derive(Error, Debug)]
pub enum RestoreError {
    /// No snapshot exists for the unit
    #[error("No backup for {unit}")]
    MissingBackup {
        /// Unit identity
        unit: String,
    },

    /// The original could not be written
    #[error("Cannot restore {unit} at {path}: {source}")]
    Write {
        /// Unit identity
        unit: String,
        /// Project-relative path
        path: PathBuf,
        #[source]
        /// IO error source
        source: io::Error,
    },
}

/// Outcome of one mutation batch
#[derive(Debug)]
pub struct BatchOutcome<E> {
    /// Units mutated successfully, in request order
    pub applied: Vec<String>,
    /// Units that could not be mutated
    pub failed: Vec<(String, E)>,
}

impl<E> Default for BatchOutcome<E> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<E: std::fmt::Display> BatchOutcome<E> {
    /// Every unit in the batch was mutated
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Identities that failed
    pub fn failed_units(&self) -> Vec<String> {
        self.failed.iter().map(|(unit, _)| unit.clone()).collect()
    }

    /// Failure messages, for phase and step records
    pub fn errors(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|(unit, e)| format!("{}: {}", unit, e))
            .collect()
    }
}

/// The project source tree, addressed by unit
pub struct WorkingTree<FS: FileSystem = RealFileSystem> {
    project_root: PathBuf,
    units: BTreeMap<String, Vec<PathBuf>>,
    stubbed: BTreeSet<String>,
    batches: u64,
    fs: FS,
}

impl WorkingTree<RealFileSystem> {
    /// Create a tree over the real filesystem
    pub fn new(project_root: &Path) -> Self {
        Self::with_fs(project_root, RealFileSystem)
    }
}

impl<FS: FileSystem> WorkingTree<FS> {
    /// Create a tree with a custom filesystem implementation
    pub fn with_fs(project_root: &Path, fs: FS) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            units: BTreeMap::new(),
            stubbed: BTreeSet::new(),
            batches: 0,
            fs,
        }
    }

    /// Project root
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Filesystem the tree writes through
    pub fn fs(&self) -> &FS {
        &self.fs
    }

    /// Learn the declaration files of every component in `graph`
    ///
    /// Units the graph already sees as stubs (left by an earlier phase) are
    /// marked stubbed.
    pub fn register(&mut self, graph: &UsageGraph) {
        for unit in graph.components() {
            let files: Vec<PathBuf> = unit.files().into_iter().map(Path::to_path_buf).collect();
            if unit.stubbed {
                self.stubbed.insert(unit.name.clone());
            }
            self.units.insert(unit.name.clone(), files);
        }
    }

    /// Declaration files of a unit
    pub fn files_of(&self, unit: &str) -> Option<&[PathBuf]> {
        self.units.get(unit).map(Vec::as_slice)
    }

    /// Whether a unit currently holds a stub
    pub fn is_stubbed(&self, unit: &str) -> bool {
        self.stubbed.contains(unit)
    }

    /// Every unit currently stubbed
    pub fn stubbed(&self) -> &BTreeSet<String> {
        &self.stubbed
    }

    /// Number of mutation batches applied so far
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Replace each unit with its stub
    ///
    /// A unit that fails is left with its original content.
    pub fn stub_batch<I>(&mut self, units: I, backups: &BackupStore<impl FileSystem>) -> BatchOutcome<TreeError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.batches += 1;
        let mut outcome = BatchOutcome::default();
        for unit in units {
            let unit = unit.as_ref();
            match self.stub_unit(unit, backups) {
                Ok(()) => outcome.applied.push(unit.to_string()),
                Err(e) => {
                    log::warn!("Could not stub {}: {}", unit, e);
                    outcome.failed.push((unit.to_string(), e));
                }
            }
        }
        outcome
    }

    /// Write each unit's original content back
    pub fn restore_batch<I>(&mut self, units: I, backups: &BackupStore<impl FileSystem>) -> BatchOutcome<RestoreError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.batches += 1;
        let mut outcome = BatchOutcome::default();
        for unit in units {
            let unit = unit.as_ref();
            match self.restore_unit(unit, backups) {
                Ok(()) => outcome.applied.push(unit.to_string()),
                Err(e) => {
                    log::warn!("Could not restore {}: {}", unit, e);
                    outcome.failed.push((unit.to_string(), e));
                }
            }
        }
        outcome
    }

    /// Restore every stubbed unit that has a backup
    pub fn restore_all(&mut self, backups: &BackupStore<impl FileSystem>) -> BatchOutcome<RestoreError> {
        let stubbed: Vec<String> = self.stubbed.iter().cloned().collect();
        self.restore_batch(stubbed, backups)
    }

    fn stub_unit(&mut self, unit: &str, backups: &BackupStore<impl FileSystem>) -> Result<(), TreeError> {
        if self.stubbed.contains(unit) {
            return Ok(());
        }
        let files = self
            .units
            .get(unit)
            .cloned()
            .ok_or_else(|| TreeError::UnknownUnit {
                unit: unit.to_string(),
            })?;

        // Generate every stub before touching the tree.
        let mut originals = Vec::with_capacity(files.len());
        let mut stubs = Vec::with_capacity(files.len());
        for file in &files {
            let absolute = self.project_root.join(file);
            let content = self
                .fs
                .read_to_string(&absolute)
                .map_err(|e| TreeError::Io {
                    path: file.clone(),
                    source: e,
                })?;
            if !is_stub(&content) {
                stubs.push((file.clone(), generate_stub(file, unit, &content)?));
            }
            originals.push(FileBackup::new(file.clone(), content));
        }

        if !backups.contains(unit) {
            backups.snapshot(unit, originals)?;
        }

        for (index, (file, stub)) in stubs.iter().enumerate() {
            let absolute = self.project_root.join(file);
            if let Err(e) = self.fs.write(&absolute, stub) {
                self.rewrite_originals(unit, &stubs[..=index], backups);
                return Err(TreeError::Io {
                    path: file.clone(),
                    source: e,
                });
            }
        }

        log::debug!("Stubbed {} ({} files)", unit, files.len());
        self.stubbed.insert(unit.to_string());
        Ok(())
    }

    fn rewrite_originals(
        &self,
        unit: &str,
        written: &[(PathBuf, String)],
        backups: &BackupStore<impl FileSystem>,
    ) {
        let Some(backup) = backups.get(unit) else {
            return;
        };
        for (file, _) in written {
            if let Some(original) = backup.files.iter().find(|f| &f.path == file) {
                if let Err(e) = self.fs.write(&self.project_root.join(file), &original.content) {
                    log::error!("Rollback of {} failed: {}", file.display(), e);
                }
            }
        }
    }

    fn restore_unit(&mut self, unit: &str, backups: &BackupStore<impl FileSystem>) -> Result<(), RestoreError> {
        let backup = backups.get(unit).ok_or_else(|| RestoreError::MissingBackup {
            unit: unit.to_string(),
        })?;
        for file in &backup.files {
            self.fs
                .write(&self.project_root.join(&file.path), &file.content)
                .map_err(|e| RestoreError::Write {
                    unit: unit.to_string(),
                    path: file.path.clone(),
                    source: e,
                })?;
        }
        log::debug!("Restored {}", unit);
        self.stubbed.remove(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifyContext, PatternClassifier, ProtectedSet, SourceScanner, UsageClassifier};
    use crate::infra::memory::MemoryFileSystem;

    const CARD: &str = "export default function Card() { return <div/>; }\nexport const GAP = 2;\n";

    fn setup() -> (MemoryFileSystem, WorkingTree<MemoryFileSystem>, BackupStore<MemoryFileSystem>) {
        let fs = MemoryFileSystem::with_files([
            ("/app/src/App.jsx", "import Card from './Card';\nexport default function App() { return <Card/>; }\n"),
            ("/app/src/Card.jsx", CARD),
        ]);
        let sources = SourceScanner::with_fs(Path::new("/app"), vec![PathBuf::from("src")], fs.clone())
            .read_sources();
        let context = ClassifyContext {
            protected: ProtectedSet::new(Vec::<String>::new(), ["App"]),
            source_roots: vec![PathBuf::from("src")],
            rarely_used_threshold: 1,
            ..Default::default()
        };
        let graph = PatternClassifier::new().classify(&sources, &context);
        let mut tree = WorkingTree::with_fs(Path::new("/app"), fs.clone());
        tree.register(&graph);
        (fs.clone(), tree, BackupStore::with_fs(fs))
    }

    #[test]
    fn test_stub_then_restore_is_exact() {
        let (fs, mut tree, backups) = setup();

        let outcome = tree.stub_batch(["Card"], &backups);
        assert!(outcome.is_clean());
        assert!(tree.is_stubbed("Card"));
        let stub = fs.content("/app/src/Card.jsx").unwrap();
        assert!(is_stub(&stub));
        assert!(stub.contains("GAP"));

        let outcome = tree.restore_batch(["Card"], &backups);
        assert!(outcome.is_clean());
        assert_eq!(fs.content("/app/src/Card.jsx").unwrap(), CARD);
        assert!(!tree.is_stubbed("Card"));
        assert_eq!(tree.batches(), 2);
    }

    #[test]
    fn test_restub_keeps_first_snapshot() {
        let (fs, mut tree, backups) = setup();
        tree.stub_batch(["Card"], &backups);
        tree.restore_batch(["Card"], &backups);
        tree.stub_batch(["Card"], &backups);
        tree.restore_all(&backups);
        assert_eq!(fs.content("/app/src/Card.jsx").unwrap(), CARD);
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let (_, mut tree, backups) = setup();
        let outcome = tree.restore_batch(["Card"], &backups);
        assert_eq!(outcome.failed_units(), vec!["Card".to_string()]);
        assert!(matches!(outcome.failed[0].1, RestoreError::MissingBackup { .. }));
    }

    #[test]
    fn test_unwritable_file_is_rolled_back() {
        let (fs, mut tree, backups) = setup();
        fs.deny_writes("/app/src/Card.jsx");
        let outcome = tree.stub_batch(["Card"], &backups);
        assert!(!outcome.is_clean());
        assert!(!tree.is_stubbed("Card"));
        assert!(outcome.errors()[0].starts_with("Card: "));
        assert_eq!(fs.content("/app/src/Card.jsx").unwrap(), CARD);
    }

    #[test]
    fn test_unknown_unit_is_reported() {
        let (_, mut tree, backups) = setup();
        let outcome = tree.stub_batch(["Ghost"], &backups);
        assert!(matches!(outcome.failed[0].1, TreeError::UnknownUnit { .. }));
    }

    #[test]
    fn test_empty_batch_is_clean_for_non_default_errors() {
        let (_, mut tree, backups) = setup();
        let stubbed = tree.stub_batch(Vec::<String>::new(), &backups);
        assert!(stubbed.is_clean() && stubbed.applied.is_empty());
        let restored: BatchOutcome<RestoreError> = BatchOutcome::default();
        assert!(restored.is_clean());
        assert!(restored.errors().is_empty());
    }
}
