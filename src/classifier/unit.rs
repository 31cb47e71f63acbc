//! Code units and the data attached to them by classification

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A position in the source tree, relative to the project root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Project-relative file path
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
}

impl Location {
    /// Create a location
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// What kind of thing a code unit is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A UI component declared in the source tree
    Component,
    /// A dependency declared in the package manifest
    Package,
}

/// Usage class assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageClass {
    /// Invoked outside its own declaration
    Rendered,
    /// Imported somewhere but never invoked
    ImportOnly,
    /// Invoked at most `threshold` times, all in one file
    RarelyUsed,
    /// Neither imported nor invoked
    Unused,
}

impl UsageClass {
    /// All classes, in display order
    pub const ALL: [UsageClass; 4] = [
        UsageClass::Rendered,
        UsageClass::RarelyUsed,
        UsageClass::ImportOnly,
        UsageClass::Unused,
    ];

    /// Whether the classifier saw this unit invoked
    pub fn is_invoked(self) -> bool {
        matches!(self, UsageClass::Rendered | UsageClass::RarelyUsed)
    }
}

impl fmt::Display for UsageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UsageClass::Rendered => "rendered",
            UsageClass::ImportOnly => "import-only",
            UsageClass::RarelyUsed => "rarely-used",
            UsageClass::Unused => "unused",
        };
        f.write_str(s)
    }
}

/// Invocations of a unit in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSite {
    /// First invocation in the file
    pub location: Location,
    /// Invocations in the file
    pub count: usize,
}

/// A named, independently removable piece of code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// Identity: component name or package name
    pub name: String,
    /// Component or package
    pub kind: UnitKind,
    /// Where the unit is declared, sorted
    pub declarations: Vec<Location>,
    /// Where the unit is invoked (for packages: imported), sorted by file
    pub usages: Vec<UsageSite>,
    /// Where the unit is imported, sorted
    pub imports: Vec<Location>,
    /// Exported symbol names across all declaration files
    pub exports: BTreeSet<String>,
    /// Assigned usage class
    pub class: UsageClass,
    /// Never eliminated
    pub protected: bool,
    /// Declaration files currently hold a stub
    pub stubbed: bool,
}

impl CodeUnit {
    /// Total number of invocations across all usage sites
    pub fn usage_count(&self) -> usize {
        self.usages.iter().map(|u| u.count).sum()
    }

    /// Number of distinct files invoking the unit
    pub fn using_files(&self) -> usize {
        self.usages.len()
    }

    /// Zero usage sites, at least one declaration site, and not protected
    pub fn is_eligible(&self) -> bool {
        !self.protected && !self.declarations.is_empty() && self.usages.is_empty()
    }

    /// Sort key for declaration order: (relative path, line) of the first declaration
    pub fn declaration_order(&self) -> Option<&Location> {
        self.declarations.first()
    }

    /// Distinct files the unit is declared in
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self.declarations.iter().map(|d| d.file.as_path()).collect();
        files.dedup();
        files
    }
}

/// Identities that are never eliminated
///
/// Built from configured names plus every unit declared in an entry-point
/// file. Entry points are file stems (`main`, `index`, `App`) matched
/// directly under a source root, or project-relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedSet {
    names: BTreeSet<String>,
    entry_stems: BTreeSet<String>,
    entry_paths: BTreeSet<PathBuf>,
}

impl ProtectedSet {
    /// Build from configured names and entry-point specs
    pub fn new<N, E>(names: N, entry_points: E) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut entry_stems = BTreeSet::new();
        let mut entry_paths = BTreeSet::new();
        for entry in entry_points {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if entry.contains('/') || entry.contains('.') {
                entry_paths.insert(PathBuf::from(entry));
            } else {
                entry_stems.insert(entry.to_string());
            }
        }
        Self {
            names: names
                .into_iter()
                .map(Into::into)
                .filter(|n: &String| !n.is_empty())
                .collect(),
            entry_stems,
            entry_paths,
        }
    }

    /// Add a name
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Whether the name is explicitly protected
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether a project-relative file is an entry point
    pub fn is_entry_file(&self, file: &Path, source_roots: &[PathBuf]) -> bool {
        if self.entry_paths.iter().any(|p| p == file) {
            return true;
        }
        let stem = match file.file_stem() {
            Some(stem) => stem.to_string_lossy(),
            None => return false,
        };
        if !self.entry_stems.contains(stem.as_ref()) {
            return false;
        }
        let parent = file.parent().unwrap_or_else(|| Path::new(""));
        source_roots.iter().any(|root| parent == root.as_path())
    }

    /// Configured names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Count of units per class, used for summaries
pub fn class_histogram<'a>(units: impl Iterator<Item = &'a CodeUnit>) -> BTreeMap<UsageClass, usize> {
    let mut counts = BTreeMap::new();
    for unit in units {
        *counts.entry(unit.class).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, usages: Vec<UsageSite>, protected: bool) -> CodeUnit {
        CodeUnit {
            name: name.to_string(),
            kind: UnitKind::Component,
            declarations: vec![Location::new(format!("src/{}.tsx", name), 1)],
            usages,
            imports: vec![],
            exports: BTreeSet::from(["default".to_string()]),
            class: UsageClass::Unused,
            protected,
            stubbed: false,
        }
    }

    #[test]
    fn test_unit_without_usages_is_eligible() {
        assert!(unit("Card", vec![], false).is_eligible());
    }

    #[test]
    fn test_protected_unit_is_never_eligible() {
        assert!(!unit("Card", vec![], true).is_eligible());
    }

    #[test]
    fn test_unit_without_declaration_is_not_eligible() {
        let mut u = unit("Card", vec![], false);
        u.declarations.clear();
        assert!(!u.is_eligible());
    }

    #[test]
    fn test_usage_count_sums_sites() {
        let u = unit(
            "Card",
            vec![
                UsageSite {
                    location: Location::new("src/A.tsx", 3),
                    count: 2,
                },
                UsageSite {
                    location: Location::new("src/B.tsx", 9),
                    count: 1,
                },
            ],
            false,
        );
        assert_eq!(u.usage_count(), 3);
        assert_eq!(u.using_files(), 2);
        assert!(!u.is_eligible());
    }

    #[test]
    fn test_location_orders_by_path_then_line() {
        let a = Location::new("src/a/Z.tsx", 40);
        let b = Location::new("src/b/A.tsx", 1);
        let c = Location::new("src/b/A.tsx", 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_protected_set_matches_entry_stem_at_source_root_only() {
        let protected = ProtectedSet::new(Vec::<String>::new(), ["main", "App"]);
        let roots = vec![PathBuf::from("src")];
        assert!(protected.is_entry_file(Path::new("src/App.tsx"), &roots));
        assert!(protected.is_entry_file(Path::new("src/main.ts"), &roots));
        assert!(!protected.is_entry_file(Path::new("src/pages/App.tsx"), &roots));
        assert!(!protected.is_entry_file(Path::new("src/Header.tsx"), &roots));
    }

    #[test]
    fn test_protected_set_matches_entry_path() {
        let protected = ProtectedSet::new(["Logo"], ["src/bootstrap/client.tsx"]);
        assert!(protected.is_entry_file(Path::new("src/bootstrap/client.tsx"), &[]));
        assert!(protected.contains("Logo"));
        assert!(!protected.contains("Header"));
    }

    #[test]
    fn test_usage_class_display_is_kebab_case() {
        assert_eq!(UsageClass::ImportOnly.to_string(), "import-only");
        assert!(UsageClass::RarelyUsed.is_invoked());
        assert!(!UsageClass::Unused.is_invoked());
    }
}
