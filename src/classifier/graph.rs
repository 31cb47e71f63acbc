//! Aggregation of per-file scans into the usage graph

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use super::exports::SourceKind;
use super::unit::{CodeUnit, Location, UnitKind, UsageClass, UsageSite};
use super::{ClassifyContext, FileScan};

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "os",
    "path", "process", "stream", "url", "util", "zlib",
];

/// Identity -> code unit, plus dependency edges and absent references
///
/// Built once per phase from a full scan and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageGraph {
    units: BTreeMap<String, CodeUnit>,
    edges: BTreeMap<String, BTreeSet<String>>,
    absent: BTreeSet<String>,
}

/// What a local binding in one file refers to
enum Binding {
    Unit(String),
    Namespace,
    Package,
}

impl UsageGraph {
    /// Aggregate scans into a graph
    pub fn build(mut scans: Vec<FileScan>, context: &ClassifyContext) -> Self {
        scans.sort_by(|a, b| a.path.cmp(&b.path));

        let files: BTreeSet<&Path> = scans.iter().map(|s| s.path.as_path()).collect();
        let mut units: BTreeMap<String, CodeUnit> = BTreeMap::new();
        let mut file_unit: BTreeMap<&Path, String> = BTreeMap::new();

        for scan in &scans {
            let Some(component) = &scan.component else {
                continue;
            };
            let unit = units
                .entry(component.name.clone())
                .or_insert_with(|| CodeUnit {
                    name: component.name.clone(),
                    kind: UnitKind::Component,
                    declarations: Vec::new(),
                    usages: Vec::new(),
                    imports: Vec::new(),
                    exports: BTreeSet::new(),
                    class: UsageClass::Unused,
                    protected: false,
                    stubbed: true,
                });
            unit.declarations
                .push(Location::new(scan.path.clone(), component.line));
            unit.exports.extend(scan.exports.names());
            unit.stubbed &= scan.stubbed;
            unit.protected |= context.protected.contains(&component.name)
                || context
                    .protected
                    .is_entry_file(&scan.path, &context.source_roots);
            file_unit.insert(scan.path.as_path(), component.name.clone());
        }

        for package in &context.packages {
            if units.contains_key(package) {
                log::warn!("Package '{}' shadows a component of the same name", package);
                continue;
            }
            units.insert(
                package.clone(),
                CodeUnit {
                    name: package.clone(),
                    kind: UnitKind::Package,
                    declarations: Vec::new(),
                    usages: Vec::new(),
                    imports: Vec::new(),
                    exports: BTreeSet::new(),
                    class: UsageClass::Unused,
                    protected: context.protected.contains(package),
                    stubbed: false,
                },
            );
        }

        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut absent = BTreeSet::new();
        // (unit, file) -> (first line, count)
        let mut usage_counts: BTreeMap<(String, PathBuf), (usize, usize)> = BTreeMap::new();
        let mut import_sites: BTreeMap<String, BTreeSet<Location>> = BTreeMap::new();

        for scan in &scans {
            let own_unit = file_unit.get(scan.path.as_path());
            let mut bindings: BTreeMap<&str, Binding> = BTreeMap::new();

            for import in &scan.imports {
                let mut targets: BTreeSet<String> = BTreeSet::new();

                if is_path_specifier(&import.specifier) {
                    let resolved =
                        resolve_specifier(&scan.path, &import.specifier, &context.source_roots, &files);
                    if resolved.is_none() && !is_asset_specifier(&import.specifier) {
                        absent.insert(import.specifier.clone());
                    }
                    let file_target = resolved.and_then(|p| file_unit.get(p)).cloned();

                    if let Some(local) = &import.default {
                        if let Some(target) = file_target.clone().or_else(|| {
                            units
                                .get(local)
                                .filter(|u| u.kind == UnitKind::Component)
                                .map(|u| u.name.clone())
                        }) {
                            bindings.insert(local.as_str(), Binding::Unit(target.clone()));
                            targets.insert(target);
                        }
                    }
                    for (imported, local) in &import.named {
                        let target = if imported == "default" {
                            file_target.clone()
                        } else {
                            units
                                .get(imported)
                                .filter(|u| u.kind == UnitKind::Component)
                                .map(|u| u.name.clone())
                        };
                        if let Some(target) = target {
                            bindings.insert(local.as_str(), Binding::Unit(target.clone()));
                            targets.insert(target);
                        }
                    }
                    if let Some(ns) = &import.namespace {
                        bindings.insert(ns.as_str(), Binding::Namespace);
                        targets.extend(file_target.clone());
                    }
                    if import.default.is_none()
                        && import.named.is_empty()
                        && import.namespace.is_none()
                    {
                        targets.extend(file_target);
                    }
                } else {
                    let package = package_name(&import.specifier);
                    if context.packages.contains(package) {
                        for local in import.locals() {
                            bindings.insert(local, Binding::Package);
                        }
                        targets.insert(package.to_string());
                    } else if !is_builtin(&import.specifier) {
                        absent.insert(package.to_string());
                    }
                }

                for target in targets {
                    if own_unit == Some(&target) {
                        continue;
                    }
                    import_sites
                        .entry(target.clone())
                        .or_default()
                        .insert(Location::new(scan.path.clone(), import.line));
                    if let Some(own) = own_unit {
                        edges.entry(own.clone()).or_default().insert(target);
                    }
                }
            }

            for invocation in &scan.invocations {
                let target = match bindings.get(invocation.local.as_str()) {
                    Some(Binding::Unit(name)) => Some(name.clone()),
                    Some(Binding::Namespace) => invocation
                        .member
                        .as_ref()
                        .filter(|m| {
                            units
                                .get(m.as_str())
                                .is_some_and(|u| u.kind == UnitKind::Component)
                        })
                        .cloned(),
                    Some(Binding::Package) | None => None,
                };
                let Some(target) = target else { continue };
                if own_unit == Some(&target) {
                    continue;
                }
                if let Some(own) = own_unit {
                    edges.entry(own.clone()).or_default().insert(target.clone());
                }
                let entry = usage_counts
                    .entry((target, scan.path.clone()))
                    .or_insert((invocation.line, 0));
                entry.1 += 1;
            }
        }

        for ((name, file), (line, count)) in usage_counts {
            if let Some(unit) = units.get_mut(&name) {
                unit.usages.push(UsageSite {
                    location: Location::new(file, line),
                    count,
                });
            }
        }

        for (name, sites) in import_sites {
            let Some(unit) = units.get_mut(&name) else {
                continue;
            };
            unit.imports = sites.into_iter().collect();
            if unit.kind == UnitKind::Package {
                // Package usage sites are its import sites.
                let mut per_file: BTreeMap<PathBuf, (usize, usize)> = BTreeMap::new();
                for site in &unit.imports {
                    let entry = per_file.entry(site.file.clone()).or_insert((site.line, 0));
                    entry.1 += 1;
                }
                unit.usages = per_file
                    .into_iter()
                    .map(|(file, (line, count))| UsageSite {
                        location: Location::new(file, line),
                        count,
                    })
                    .collect();
            }
        }

        for unit in units.values_mut() {
            unit.declarations.sort();
            unit.class = assign_class(unit, context.rarely_used_threshold);
        }

        Self {
            units,
            edges,
            absent,
        }
    }

    /// Look up a unit by identity
    pub fn get(&self, name: &str) -> Option<&CodeUnit> {
        self.units.get(name)
    }

    /// All units in identity order
    pub fn units(&self) -> impl Iterator<Item = &CodeUnit> {
        self.units.values()
    }

    /// Component units in identity order
    pub fn components(&self) -> impl Iterator<Item = &CodeUnit> {
        self.units.values().filter(|u| u.kind == UnitKind::Component)
    }

    /// Package units in identity order
    pub fn packages(&self) -> impl Iterator<Item = &CodeUnit> {
        self.units.values().filter(|u| u.kind == UnitKind::Package)
    }

    /// Number of component units
    pub fn component_count(&self) -> usize {
        self.components().count()
    }

    /// Number of package units
    pub fn package_count(&self) -> usize {
        self.packages().count()
    }

    /// Number of live (not stubbed) component units
    pub fn live_component_count(&self) -> usize {
        self.components().filter(|u| !u.stubbed).count()
    }

    /// Number of packages something still imports
    pub fn used_package_count(&self) -> usize {
        self.packages().filter(|u| !u.imports.is_empty()).count()
    }

    /// Units this unit imports or invokes
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<&str> {
        self.edges
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Units importing or invoking this unit
    pub fn dependents_of(&self, name: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Imports that resolve to nothing declared
    pub fn absent_references(&self) -> &BTreeSet<String> {
        &self.absent
    }

    /// Eligible components: no usage sites, declared, not protected
    pub fn eligible(&self) -> Vec<&CodeUnit> {
        self.components().filter(|u| u.is_eligible()).collect()
    }

    /// Identities of live, unprotected components passing `filter`, in elimination order
    ///
    /// Ascending usage count, ties broken by declaration order (relative
    /// path, then line).
    pub fn elimination_order<F>(&self, filter: F) -> Vec<String>
    where
        F: Fn(&CodeUnit) -> bool,
    {
        let mut candidates: Vec<&CodeUnit> = self
            .components()
            .filter(|u| !u.protected && !u.stubbed && !u.declarations.is_empty())
            .filter(|u| filter(u))
            .collect();
        candidates.sort_by(|a, b| {
            a.usage_count()
                .cmp(&b.usage_count())
                .then_with(|| a.declaration_order().cmp(&b.declaration_order()))
                .then_with(|| a.name.cmp(&b.name))
        });
        candidates.into_iter().map(|u| u.name.clone()).collect()
    }

    /// Count of component units per class
    pub fn class_counts(&self) -> BTreeMap<UsageClass, usize> {
        super::unit::class_histogram(self.components())
    }
}

fn assign_class(unit: &CodeUnit, threshold: usize) -> UsageClass {
    let count = unit.usage_count();
    if count == 0 {
        if unit.imports.is_empty() {
            UsageClass::Unused
        } else {
            UsageClass::ImportOnly
        }
    } else if count <= threshold && unit.using_files() == 1 {
        UsageClass::RarelyUsed
    } else {
        UsageClass::Rendered
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || specifier.starts_with("@/")
        || specifier.starts_with("~/")
        || specifier.starts_with('/')
}

fn is_asset_specifier(specifier: &str) -> bool {
    let path = Path::new(specifier.split(['?', '#']).next().unwrap_or(specifier));
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !SourceKind::EXTENSIONS.contains(&ext) && ext != "json",
        None => false,
    }
}

fn is_builtin(specifier: &str) -> bool {
    specifier.starts_with("node:")
        || specifier.starts_with("virtual:")
        || NODE_BUILTINS.contains(&package_name(specifier))
}

/// `@scope/pkg/sub` -> `@scope/pkg`, `pkg/sub` -> `pkg`
pub fn package_name(specifier: &str) -> &str {
    let mut slashes = specifier.match_indices('/');
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((i, _)) => &specifier[..i],
        None => specifier,
    }
}

/// Resolve an import to a scanned file, trying extensions and index files
pub fn resolve_specifier<'a>(
    importer: &Path,
    specifier: &str,
    source_roots: &[PathBuf],
    files: &BTreeSet<&'a Path>,
) -> Option<&'a Path> {
    let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);
    let base = if let Some(rest) = specifier
        .strip_prefix("@/")
        .or_else(|| specifier.strip_prefix("~/"))
    {
        source_roots
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("src"))
            .join(rest)
    } else if let Some(rest) = specifier.strip_prefix('/') {
        PathBuf::from(rest)
    } else {
        importer
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(specifier)
    };
    let base = normalize(&base);

    let lookup = |candidate: PathBuf| files.get(candidate.as_path()).copied();

    if let Some(found) = lookup(base.clone()) {
        return Some(found);
    }
    let base_str = base.to_string_lossy();
    for ext in SourceKind::EXTENSIONS {
        if let Some(found) = lookup(PathBuf::from(format!("{}.{}", base_str, ext))) {
            return Some(found);
        }
    }
    for ext in SourceKind::EXTENSIONS {
        if let Some(found) = lookup(base.join(format!("index.{}", ext))) {
            return Some(found);
        }
    }
    None
}

/// Lexically normalize `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
