//! Package manifest access
//!
//! The manifest supplies the package units for classification and, at the
//! end of a run, the list of packages only removed code imported. Nothing
//! here ever rewrites the manifest.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classifier::UsageGraph;
use crate::infra::FileSystem;

/// Manifest read failures
#[derive(Error, Debug)]
pub enum ManifestError {
    /// File missing or unreadable
    #[error("cannot read {path}: {source}")]
    Read {
        /// Manifest path
        path: PathBuf,
        #[source]
        /// IO error source
        source: io::Error,
    },

    /// Not valid JSON, or dependency tables of the wrong shape
    #[error("cannot parse {path}: {reason}")]
    Parse {
        /// Manifest path
        path: PathBuf,
        /// Parser message
        reason: String,
    },
}

/// Read access to a project's dependency declarations
pub trait ManifestEditor {
    /// Where the manifest lives
    fn path(&self) -> &Path;

    /// Packages shipped with the application
    fn packages(&self) -> BTreeSet<String>;

    /// Declared packages whose every import site is in a removed component
    ///
    /// `graph` must be a classification taken before the components were
    /// stubbed, so import sites are still visible.
    fn droppable(&self, graph: &UsageGraph, removed: &[String]) -> Vec<String> {
        let removed_files: BTreeSet<&Path> = removed
            .iter()
            .filter_map(|name| graph.get(name))
            .flat_map(|unit| unit.files())
            .collect();
        let declared = self.packages();
        graph
            .packages()
            .filter(|pkg| declared.contains(&pkg.name) && !pkg.protected)
            .filter(|pkg| {
                !pkg.imports.is_empty()
                    && pkg
                        .imports
                        .iter()
                        .all(|site| removed_files.contains(site.file.as_path()))
            })
            .map(|pkg| pkg.name.clone())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, serde_json::Value>,
}

/// `package.json` manifest
#[derive(Debug, Clone)]
pub struct PackageJsonManifest {
    path: PathBuf,
    packages: BTreeSet<String>,
}

impl PackageJsonManifest {
    /// Read and parse `path`
    pub fn load<FS: FileSystem>(path: &Path, fs: &FS) -> Result<Self, ManifestError> {
        let raw = fs.read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(path, &raw)
    }

    /// Parse manifest text
    pub fn parse(path: &Path, raw: &str) -> Result<Self, ManifestError> {
        let manifest: PackageJson = serde_json::from_str(raw).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // devDependencies never reach the bundle
        let packages = manifest
            .dependencies
            .into_keys()
            .chain(manifest.optional_dependencies.into_keys())
            .chain(manifest.peer_dependencies.into_keys())
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            packages,
        })
    }
}

impl ManifestEditor for PackageJsonManifest {
    fn path(&self) -> &Path {
        &self.path
    }

    fn packages(&self) -> BTreeSet<String> {
        self.packages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifyContext, PatternClassifier, ProtectedSet, SourceScanner, UsageClassifier};
    use crate::infra::memory::MemoryFileSystem;

    const PACKAGE_JSON: &str = r#"{
  "name": "shop",
  "dependencies": { "react": "^18.2.0", "chart.js": "^4.0.0", "dayjs": "^1.11.0" },
  "devDependencies": { "vite": "^5.0.0" }
}"#;

    #[test]
    fn test_parse_reads_shipped_dependency_tables() {
        let manifest = PackageJsonManifest::parse(Path::new("package.json"), PACKAGE_JSON).unwrap();
        let packages: Vec<String> = manifest.packages().into_iter().collect();
        assert_eq!(packages, vec!["chart.js", "dayjs", "react"]);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = PackageJsonManifest::parse(Path::new("package.json"), "{ nope").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_manifest_fails() {
        let fs = MemoryFileSystem::new();
        let err = PackageJsonManifest::load(Path::new("/app/package.json"), &fs).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn test_droppable_lists_packages_only_removed_code_imports() {
        let fs = MemoryFileSystem::with_files([
            ("/app/package.json", PACKAGE_JSON),
            (
                "/app/src/App.jsx",
                "import React from 'react';\nimport dayjs from 'dayjs';\nexport default function App() { return null; }\n",
            ),
            (
                "/app/src/Chart.jsx",
                "import { Chart as C } from 'chart.js';\nimport dayjs from 'dayjs';\nexport default function Chart() { return null; }\n",
            ),
        ]);
        let manifest = PackageJsonManifest::load(Path::new("/app/package.json"), &fs).unwrap();
        let sources = SourceScanner::with_fs(Path::new("/app"), vec![PathBuf::from("src")], fs.clone()).read_sources();
        let context = ClassifyContext {
            packages: manifest.packages(),
            protected: ProtectedSet::new(Vec::<String>::new(), ["App"]),
            source_roots: vec![PathBuf::from("src")],
            rarely_used_threshold: 1,
        };
        let graph = PatternClassifier::new().classify(&sources, &context);

        let droppable = manifest.droppable(&graph, &["Chart".to_string()]);
        assert_eq!(droppable, vec!["chart.js".to_string()]);
        assert!(manifest.droppable(&graph, &[]).is_empty());
    }
}
