//! Regex-based usage classifier
//!
//! Recognizes:
//! - declarations: `export default function X`, `export const X =`, `class X`,
//!   and single-file components (`.vue`, `.svelte`)
//! - imports: `import ... from '...'`, `require('...')`, `import('...')`,
//!   including `lazy(() => import(...))` bindings
//! - invocations: JSX `<X`, `createElement(X`, `h(X`, kebab-case tags in
//!   single-file components, and bare references to imported bindings

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use super::exports::{extract_exports, is_pascal_case, ExportSet, SourceKind};
use super::{
    DeclaredComponent, FileScan, ImportRef, Invocation, ScanError, SourceFile, UsageClassifier,
    MAX_SCAN_BYTES,
};
use crate::engine::stub::stub_marker_name;

static STATIC_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static SIDE_EFFECT_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static LAZY_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static DYNAMIC_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static REQUIRE_BINDING_RE: OnceLock<Regex> = OnceLock::new();
static REQUIRE_DESTRUCTURE_RE: OnceLock<Regex> = OnceLock::new();
static REQUIRE_RE: OnceLock<Regex> = OnceLock::new();
static REFERENCE_RE: OnceLock<Regex> = OnceLock::new();
static KEBAB_TAG_RE: OnceLock<Regex> = OnceLock::new();
static EXPORT_ONLY_LINE_RE: OnceLock<Regex> = OnceLock::new();

/// Heuristic classifier over raw source text
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    /// Create a new pattern classifier
    pub fn new() -> Self {
        Self
    }

    /// Scan already-decoded content
    pub fn scan_text(&self, path: &Path, content: &str, kind: SourceKind) -> FileScan {
        let lines = LineIndex::new(content);
        let exports = extract_exports(content, kind);
        let stub_name = stub_marker_name(content);
        let (imports, import_lines) = scan_imports(content, &lines);
        let component = detect_component(path, content, kind, &exports, stub_name, &lines);
        let invocations = if stub_name.is_some() {
            Vec::new()
        } else {
            scan_invocations(content, kind, &imports, &import_lines)
        };

        FileScan {
            path: path.to_path_buf(),
            kind,
            component,
            exports,
            imports,
            invocations,
            stubbed: stub_name.is_some(),
        }
    }
}

impl UsageClassifier for PatternClassifier {
    fn name(&self) -> &str {
        "pattern"
    }

    fn scan_file(&self, file: &SourceFile) -> Result<FileScan, ScanError> {
        let kind = SourceKind::from_path(&file.path).ok_or_else(|| ScanError::UnsupportedKind {
            path: file.path.clone(),
        })?;
        if file.bytes.len() > MAX_SCAN_BYTES {
            return Err(ScanError::TooLarge {
                path: file.path.clone(),
                size: file.bytes.len(),
            });
        }
        let content = std::str::from_utf8(&file.bytes).map_err(|_| ScanError::NotUtf8 {
            path: file.path.clone(),
        })?;
        Ok(self.scan_text(&file.path, content, kind))
    }
}

/// Byte offset to 1-based line lookup
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

fn compile(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| {
        // SAFETY: every pattern passed here is a literal exercised by the unit tests below.
        Regex::new(pattern).expect("hard-coded regex is valid")
    })
}

/// Accumulates imports, deduplicated by (line, specifier)
#[derive(Default)]
struct ImportCollector {
    imports: Vec<ImportRef>,
    import_lines: BTreeSet<usize>,
    seen: BTreeSet<(usize, String)>,
}

impl ImportCollector {
    /// Record an import; `span` marks its lines as import statements
    fn add(&mut self, import: ImportRef, span: Option<(usize, usize)>) {
        if let Some((first, last)) = span {
            self.import_lines.extend(first..=last);
        }
        if self.seen.insert((import.line, import.specifier.clone())) {
            self.imports.push(import);
        }
    }
}

fn scan_imports(content: &str, lines: &LineIndex) -> (Vec<ImportRef>, BTreeSet<usize>) {
    let mut collector = ImportCollector::default();
    let span = |start: usize, end: usize| {
        Some((
            lines.line_of(start),
            lines.line_of(end.saturating_sub(1).max(start)),
        ))
    };

    let static_re = compile(
        &STATIC_IMPORT_RE,
        r#"(?m)^[ \t]*import\s+(type\s+)?([^'";]*?)\s*from\s*['"]([^'"]+)['"]"#,
    );
    for cap in static_re.captures_iter(content) {
        let (Some(whole), Some(clause), Some(spec)) = (cap.get(0), cap.get(2), cap.get(3)) else {
            continue;
        };
        let mut import = bare_import(spec.as_str(), lines.line_of(whole.start()));
        if cap.get(1).is_none() {
            parse_import_clause(clause.as_str(), &mut import);
        }
        collector.add(import, span(whole.start(), whole.end()));
    }

    let side_effect_re = compile(
        &SIDE_EFFECT_IMPORT_RE,
        r#"(?m)^[ \t]*import\s*['"]([^'"]+)['"]"#,
    );
    for cap in side_effect_re.captures_iter(content) {
        let (Some(whole), Some(spec)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let import = bare_import(spec.as_str(), lines.line_of(whole.start()));
        collector.add(import, span(whole.start(), whole.end()));
    }

    let lazy_re = compile(
        &LAZY_IMPORT_RE,
        r#"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:React\.)?(?:lazy|defineAsyncComponent|loadable)\(\s*(?:async\s*)?\(\s*\)\s*=>\s*import\(\s*['"]([^'"]+)['"]\s*\)"#,
    );
    for cap in lazy_re.captures_iter(content) {
        let (Some(whole), Some(local), Some(spec)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let mut import = bare_import(spec.as_str(), lines.line_of(whole.start()));
        import.default = Some(local.as_str().to_string());
        collector.add(import, span(whole.start(), whole.end()));
    }

    let dynamic_re = compile(&DYNAMIC_IMPORT_RE, r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#);
    for cap in dynamic_re.captures_iter(content) {
        let (Some(whole), Some(spec)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        collector.add(bare_import(spec.as_str(), lines.line_of(whole.start())), None);
    }

    let require_binding_re = compile(
        &REQUIRE_BINDING_RE,
        r#"(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
    );
    for cap in require_binding_re.captures_iter(content) {
        let (Some(whole), Some(local), Some(spec)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let mut import = bare_import(spec.as_str(), lines.line_of(whole.start()));
        import.default = Some(local.as_str().to_string());
        collector.add(import, span(whole.start(), whole.end()));
    }

    let require_destructure_re = compile(
        &REQUIRE_DESTRUCTURE_RE,
        r#"(?:const|let|var)\s*\{([^}]*)\}\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
    );
    for cap in require_destructure_re.captures_iter(content) {
        let (Some(whole), Some(list), Some(spec)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let mut import = bare_import(spec.as_str(), lines.line_of(whole.start()));
        import.named = parse_named_list(list.as_str(), ":");
        collector.add(import, span(whole.start(), whole.end()));
    }

    let require_re = compile(&REQUIRE_RE, r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#);
    for cap in require_re.captures_iter(content) {
        let (Some(whole), Some(spec)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        collector.add(bare_import(spec.as_str(), lines.line_of(whole.start())), None);
    }

    let ImportCollector {
        mut imports,
        import_lines,
        ..
    } = collector;
    imports.sort_by(|a, b| (a.line, &a.specifier).cmp(&(b.line, &b.specifier)));
    (imports, import_lines)
}

fn bare_import(specifier: &str, line: usize) -> ImportRef {
    ImportRef {
        specifier: specifier.to_string(),
        line,
        default: None,
        named: Vec::new(),
        namespace: None,
    }
}

/// Parse `Default, { A, B as C, type T }` or `* as ns`
fn parse_import_clause(clause: &str, import: &mut ImportRef) {
    let mut rest = clause.trim();

    if let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').map(|i| open + i).unwrap_or(rest.len());
        import.named = parse_named_list(&rest[open + 1..close], " as ");
        let before = rest[..open].trim().trim_end_matches(',').trim();
        rest = before;
    }

    for part in rest.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(ns) = part.strip_prefix('*') {
            let ns = ns.trim().trim_start_matches("as").trim();
            if !ns.is_empty() {
                import.namespace = Some(ns.to_string());
            }
        } else if is_identifier(part) {
            import.default = Some(part.to_string());
        }
    }
}

fn parse_named_list(list: &str, alias_sep: &str) -> Vec<(String, String)> {
    list.split(',')
        .filter_map(|item| {
            let item = item.trim();
            if item.is_empty() || item.starts_with("type ") {
                return None;
            }
            let (imported, local) = match item.split_once(alias_sep) {
                Some((imported, local)) => (imported.trim(), local.trim()),
                None => (item, item),
            };
            if is_identifier(imported) && is_identifier(local) {
                Some((imported.to_string(), local.to_string()))
            } else {
                None
            }
        })
        .collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn detect_component(
    path: &Path,
    content: &str,
    kind: SourceKind,
    exports: &ExportSet,
    stub_name: Option<&str>,
    lines: &LineIndex,
) -> Option<DeclaredComponent> {
    let stem = path.file_stem()?.to_string_lossy();
    let stem_name = pascal_from_stem(&stem);

    if let Some(name) = stub_name {
        return Some(DeclaredComponent {
            name: name.to_string(),
            line: 1,
        });
    }

    if kind.is_single_file_component() {
        return Some(DeclaredComponent {
            name: stem_name?,
            line: 1,
        });
    }

    let name = match &exports.default_name {
        Some(name) if is_pascal_case(name) => name.clone(),
        // Companion files only declare what they name explicitly.
        _ if stem.contains('.') => return None,
        _ => {
            let stem_name = stem_name.filter(|s| is_pascal_case(s));
            match stem_name {
                Some(stem_name)
                    if exports.has_default
                        || exports.pascal_case_names().any(|n| *n == stem_name) =>
                {
                    stem_name
                }
                _ => exports.pascal_case_names().next()?.clone(),
            }
        }
    };

    Some(DeclaredComponent {
        line: declaration_line(content, &name, lines),
        name,
    })
}

fn declaration_line(content: &str, name: &str, lines: &LineIndex) -> usize {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let declares = (trimmed.starts_with("export") || trimmed.starts_with("class")
            || trimmed.starts_with("function") || trimmed.starts_with("const"))
            && line
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
                .any(|word| word == name);
        if declares {
            return lines.line_of(offset);
        }
        offset += line.len();
    }
    1
}

/// `my-button` -> `MyButton`, `Card` -> `Card`, `index` -> None
///
/// Qualified stems such as `Card.stories` or `Card.test` name companion
/// files, not components.
fn pascal_from_stem(stem: &str) -> Option<String> {
    if stem.contains('.') {
        return None;
    }
    let name: String = stem
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    let is_component_stem = stem.contains('-')
        || stem.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if is_component_stem && is_pascal_case(&name) {
        Some(name)
    } else {
        None
    }
}

fn scan_invocations(
    content: &str,
    kind: SourceKind,
    imports: &[ImportRef],
    import_lines: &BTreeSet<usize>,
) -> Vec<Invocation> {
    let mut locals: BTreeMap<&str, bool> = BTreeMap::new();
    for import in imports {
        if let Some(default) = &import.default {
            locals.insert(default.as_str(), false);
        }
        for (_, local) in &import.named {
            locals.insert(local.as_str(), false);
        }
        if let Some(ns) = &import.namespace {
            locals.insert(ns.as_str(), true);
        }
    }
    if locals.is_empty() {
        return Vec::new();
    }

    let reference_re = compile(&REFERENCE_RE, r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)?");
    let kebab_re = compile(&KEBAB_TAG_RE, r"<([a-z][a-z0-9]*(?:-[a-z0-9]+)+)");
    let export_only_re = compile(
        &EXPORT_ONLY_LINE_RE,
        r"^\s*export\s*(?:\{[^}]*\}\s*;?|default\s+[A-Za-z_$][\w$]*\s*;?)\s*$",
    );

    let mut invocations = Vec::new();
    let mut in_block_comment = false;
    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim_start();

        if in_block_comment {
            if trimmed.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.starts_with("/*") && !trimmed.contains("*/") {
            in_block_comment = true;
            continue;
        }
        if import_lines.contains(&line_no)
            || trimmed.starts_with("//")
            || trimmed.starts_with('*')
            || export_only_re.is_match(line)
        {
            continue;
        }

        for m in reference_re.find_iter(line) {
            let before = &line[..m.start()];
            if before.ends_with('.') || before.ends_with("</") {
                continue;
            }
            let token = m.as_str();
            let (head, member) = match token.split_once('.') {
                Some((head, member)) => (head, Some(member)),
                None => (token, None),
            };
            match locals.get(head) {
                Some(true) => invocations.push(Invocation {
                    local: head.to_string(),
                    member: member.map(str::to_string),
                    line: line_no,
                }),
                Some(false) => invocations.push(Invocation {
                    local: head.to_string(),
                    member: None,
                    line: line_no,
                }),
                None => {}
            }
        }

        if kind.is_single_file_component() {
            for cap in kebab_re.captures_iter(line) {
                let Some(tag) = cap.get(1) else { continue };
                if let Some(name) = pascal_from_stem(tag.as_str()) {
                    if locals.get(name.as_str()) == Some(&false) {
                        invocations.push(Invocation {
                            local: name,
                            member: None,
                            line: line_no,
                        });
                    }
                }
            }
        }
    }
    invocations
}
