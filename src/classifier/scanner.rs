//! Source discovery

use std::path::{Path, PathBuf};

use super::exports::SourceKind;
use super::{ScanError, SourceFile};
use crate::infra::{FileSystem, RealFileSystem};

const SKIPPED_DIRS: &[&str] = &["node_modules", "coverage"];

/// Walks source roots and reads every candidate file
pub struct SourceScanner<FS: FileSystem = RealFileSystem> {
    project_root: PathBuf,
    source_dirs: Vec<PathBuf>,
    exclude: Vec<String>,
    dist_dir: Option<PathBuf>,
    fs: FS,
}

impl SourceScanner<RealFileSystem> {
    /// Create a scanner over the real filesystem
    pub fn new(project_root: &Path, source_dirs: Vec<PathBuf>) -> Self {
        Self::with_fs(project_root, source_dirs, RealFileSystem)
    }
}

impl<FS: FileSystem> SourceScanner<FS> {
    /// Create a scanner with a custom filesystem implementation
    pub fn with_fs(project_root: &Path, source_dirs: Vec<PathBuf>, fs: FS) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            source_dirs,
            exclude: Vec::new(),
            dist_dir: None,
            fs,
        }
    }

    /// Skip paths containing any of these fragments
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Skip the build output directory
    pub fn with_dist_dir(mut self, dist_dir: PathBuf) -> Self {
        self.dist_dir = Some(dist_dir);
        self
    }

    /// Project-relative paths of every candidate file, sorted
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.source_dirs {
            let absolute = self.project_root.join(dir);
            if !self.fs.is_dir(&absolute) {
                log::warn!("Source directory {} does not exist", absolute.display());
                continue;
            }
            self.walk(&absolute, &mut found);
        }
        found.sort();
        found.dedup();
        found
    }

    /// Read every discovered file
    ///
    /// Unreadable files are logged and left out.
    pub fn read_sources(&self) -> Vec<SourceFile> {
        self.discover()
            .into_iter()
            .filter_map(|relative| match self.read(&relative) {
                Ok(source) => Some(source),
                Err(e) => {
                    log::warn!("Skipping file: {}", e);
                    None
                }
            })
            .collect()
    }

    fn read(&self, relative: &Path) -> Result<SourceFile, ScanError> {
        let absolute = self.project_root.join(relative);
        // Read as text; a decoding failure is reported as a scan error.
        match self.fs.read_to_string(&absolute) {
            Ok(content) => Ok(SourceFile::new(relative, content)),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => Err(ScanError::NotUtf8 {
                path: relative.to_path_buf(),
            }),
            Err(source) => Err(ScanError::Unreadable {
                path: relative.to_path_buf(),
                source,
            }),
        }
    }

    fn walk(&self, dir: &Path, found: &mut Vec<PathBuf>) {
        let entries = match self.fs.list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot list {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries {
            let Ok(relative) = entry.strip_prefix(&self.project_root) else {
                continue;
            };
            if self.is_skipped(relative) {
                continue;
            }
            if self.fs.is_dir(&entry) {
                self.walk(&entry, found);
            } else if SourceKind::from_path(&entry).is_some() && !is_declaration_file(&entry) {
                found.push(relative.to_path_buf());
            }
        }
    }

    fn is_skipped(&self, relative: &Path) -> bool {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&&*name) {
            return true;
        }
        if self.dist_dir.as_deref() == Some(relative) {
            return true;
        }
        let display = relative.to_string_lossy();
        self.exclude
            .iter()
            .any(|fragment| !fragment.is_empty() && display.contains(fragment.as_str()))
    }
}

fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(".d.ts"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryFileSystem;
    use tempfile::TempDir;

    fn fixture() -> MemoryFileSystem {
        MemoryFileSystem::with_files([
            ("/app/src/App.tsx", "export default function App() {}"),
            ("/app/src/components/Button.jsx", "export default function Button() {}"),
            ("/app/src/components/Button.module.css", ".b{}"),
            ("/app/src/components/__stories__/Button.stories.tsx", "x"),
            ("/app/src/types.d.ts", "declare module 'x';"),
            ("/app/src/node_modules/pkg/index.js", "x"),
            ("/app/src/.cache/Thing.js", "x"),
            ("/app/lib/Other.tsx", "x"),
        ])
    }

    #[test]
    fn test_discover_filters_extensions_and_skipped_dirs() {
        let scanner = SourceScanner::with_fs(Path::new("/app"), vec![PathBuf::from("src")], fixture());
        assert_eq!(
            scanner.discover(),
            vec![
                PathBuf::from("src/App.tsx"),
                PathBuf::from("src/components/Button.jsx"),
                PathBuf::from("src/components/__stories__/Button.stories.tsx"),
            ]
        );
    }

    #[test]
    fn test_discover_applies_excludes() {
        let scanner = SourceScanner::with_fs(Path::new("/app"), vec![PathBuf::from("src")], fixture())
            .with_exclude(vec!["__stories__".to_string()]);
        assert_eq!(scanner.discover().len(), 2);
    }

    #[test]
    fn test_discover_missing_source_dir_yields_nothing() {
        let scanner =
            SourceScanner::with_fs(Path::new("/app"), vec![PathBuf::from("app")], fixture());
        assert!(scanner.discover().is_empty());
    }

    #[test]
    fn test_read_sources_on_real_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("pages")).unwrap();
        std::fs::write(src.join("main.ts"), "import './pages/Home';").unwrap();
        std::fs::write(src.join("pages/Home.svelte"), "<h1>Home</h1>").unwrap();
        std::fs::write(src.join("pages/logo.png"), [0u8, 1, 2]).unwrap();

        let scanner = SourceScanner::new(temp.path(), vec![PathBuf::from("src")]);
        let sources = scanner.read_sources();
        let paths: Vec<_> = sources.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("src/main.ts"), PathBuf::from("src/pages/Home.svelte")]
        );
    }
}
