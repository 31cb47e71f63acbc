//! Usage classification
//!
//! Scans a source tree and builds the [`UsageGraph`]: every component and
//! package, where it is declared, imported, and invoked, and the usage
//! class that drives elimination.
//!
//! Classification is a pure scan. Files are scanned in parallel with
//! `rayon`; all scans are joined before aggregation, and aggregation works
//! on ordered maps, so a fixed tree always produces the same graph.
//!
//! The per-file strategy is pluggable through [`UsageClassifier`]. The
//! shipped [`PatternClassifier`] uses text heuristics; a parser-backed
//! implementation can replace it without touching the engines.

pub mod exports;
pub mod graph;
pub mod patterns;
pub mod scanner;
pub mod unit;

pub use exports::{extract_exports, ExportSet, SourceKind};
pub use graph::UsageGraph;
pub use patterns::PatternClassifier;
pub use scanner::SourceScanner;
pub use unit::{CodeUnit, Location, ProtectedSet, UnitKind, UsageClass, UsageSite};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Files larger than this are skipped rather than scanned
pub const MAX_SCAN_BYTES: usize = 2 * 1024 * 1024;

/// A single file failed classification; the file is skipped
#[derive(Error, Debug)]
pub enum ScanError {
    /// File could not be read
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        /// Project-relative path
        path: PathBuf,
        #[source]
        /// IO error source
        source: std::io::Error,
    },

    /// File is not valid UTF-8
    #[error("{path} is not valid UTF-8")]
    NotUtf8 {
        /// Project-relative path
        path: PathBuf,
    },

    /// File exceeds [`MAX_SCAN_BYTES`]
    #[error("{path} is too large to scan ({size} bytes)")]
    TooLarge {
        /// Project-relative path
        path: PathBuf,
        /// File size in bytes
        size: usize,
    },

    /// Extension is not a known source kind
    #[error("{path} is not a recognized source file")]
    UnsupportedKind {
        /// Project-relative path
        path: PathBuf,
    },
}

/// Raw file handed to a classifier
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Project-relative path
    pub path: PathBuf,
    /// File content as read
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Create a source file from text
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: content.into(),
        }
    }
}

/// Component declared by a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredComponent {
    /// Component identity
    pub name: String,
    /// Line of the declaration
    pub line: usize,
}

/// One import statement (static, dynamic, or `require`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    /// Module specifier as written
    pub specifier: String,
    /// Line of the import
    pub line: usize,
    /// Local name of the default import
    pub default: Option<String>,
    /// Named imports as (imported, local)
    pub named: Vec<(String, String)>,
    /// Local name of a namespace import
    pub namespace: Option<String>,
}

impl ImportRef {
    /// Local names this import binds
    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.default
            .iter()
            .map(String::as_str)
            .chain(self.named.iter().map(|(_, local)| local.as_str()))
            .chain(self.namespace.iter().map(String::as_str))
    }
}

/// An invocation of a locally bound name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Local binding invoked (for `ns.Member`, the namespace)
    pub local: String,
    /// Member accessed through a namespace binding
    pub member: Option<String>,
    /// Line of the invocation
    pub line: usize,
}

/// Everything a classifier learned from one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileScan {
    /// Project-relative path
    pub path: PathBuf,
    /// Kind of source
    pub kind: SourceKind,
    /// Component declared by this file
    pub component: Option<DeclaredComponent>,
    /// Exported symbols
    pub exports: ExportSet,
    /// Imports in file order
    pub imports: Vec<ImportRef>,
    /// Invocations of imported bindings in file order
    pub invocations: Vec<Invocation>,
    /// The file holds a stub written by bundle-slim
    pub stubbed: bool,
}

/// Inputs to aggregation that do not come from the files themselves
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    /// Packages declared in the manifest
    pub packages: BTreeSet<String>,
    /// Names and entry points that are never eliminated
    pub protected: ProtectedSet,
    /// Source roots, project-relative (first one backs the `@/` alias)
    pub source_roots: Vec<PathBuf>,
    /// Invocation count at or below which a single-file user is rarely used
    pub rarely_used_threshold: usize,
}

/// Pluggable per-file usage classification
pub trait UsageClassifier: Send + Sync {
    /// Classifier name, for logs
    fn name(&self) -> &str;

    /// Scan one file
    fn scan_file(&self, file: &SourceFile) -> Result<FileScan, ScanError>;

    /// Scan every file in parallel and aggregate into a graph
    ///
    /// A file that fails to scan is logged and skipped.
    fn classify(&self, sources: &[SourceFile], context: &ClassifyContext) -> UsageGraph {
        let scans: Vec<FileScan> = sources
            .par_iter()
            .filter_map(|source| match self.scan_file(source) {
                Ok(scan) => Some(scan),
                Err(e) => {
                    log::warn!("{}: skipping file: {}", self.name(), e);
                    None
                }
            })
            .collect();

        log::debug!(
            "{}: scanned {} of {} files",
            self.name(),
            scans.len(),
            sources.len()
        );
        UsageGraph::build(scans, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClassifier;

    impl UsageClassifier for FailingClassifier {
        fn name(&self) -> &str {
            "failing"
        }

        fn scan_file(&self, file: &SourceFile) -> Result<FileScan, ScanError> {
            Err(ScanError::NotUtf8 {
                path: file.path.clone(),
            })
        }
    }

    #[test]
    fn test_classify_skips_failing_files_without_aborting() {
        let sources = vec![SourceFile::new("src/A.tsx", "export default function A() {}")];
        let graph = FailingClassifier.classify(&sources, &ClassifyContext::default());
        assert_eq!(graph.component_count(), 0);
    }

    #[test]
    fn test_import_ref_locals_lists_every_binding() {
        let import = ImportRef {
            specifier: "./ui".to_string(),
            line: 1,
            default: Some("Ui".to_string()),
            named: vec![("Button".to_string(), "Btn".to_string())],
            namespace: None,
        };
        assert_eq!(import.locals().collect::<Vec<_>>(), vec!["Ui", "Btn"]);
    }
}
