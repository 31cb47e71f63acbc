//! Explicit state owned by the orchestrator
//!
//! [`BackupStore`] holds the original content of every unit the run has
//! touched; [`WorkingTree`] applies stubs and restores to the source tree.

pub mod backup;
pub mod tree;

pub use backup::{
    format_timestamp, BackupError, BackupIndex, BackupStore, FileBackup, IndexEntry, UnitBackup, INDEX_FILE_NAME,
};
pub use tree::{BatchOutcome, RestoreError, TreeError, WorkingTree};
