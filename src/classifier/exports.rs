//! Exported symbol extraction
//!
//! Used by the classifier to find component declarations and by stub
//! generation to prove a stub exports exactly what the original did.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

static EXPORT_DEFAULT_RE: OnceLock<Regex> = OnceLock::new();
static EXPORT_DECL_RE: OnceLock<Regex> = OnceLock::new();
static EXPORT_BINDING_RE: OnceLock<Regex> = OnceLock::new();
static EXPORT_LIST_RE: OnceLock<Regex> = OnceLock::new();
static EXPORT_STAR_RE: OnceLock<Regex> = OnceLock::new();
static SCRIPT_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

/// Kind of source file, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `.js`, `.jsx`, `.mjs`, `.cjs`
    Script,
    /// `.ts`, `.tsx`
    TypeScript,
    /// `.vue` single-file component
    Vue,
    /// `.svelte` single-file component
    Svelte,
}

impl SourceKind {
    /// Extensions picked up by source discovery
    pub const EXTENSIONS: [&'static str; 8] =
        ["js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte"];

    /// Classify a path by extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceKind::Script),
            "ts" | "tsx" => Some(SourceKind::TypeScript),
            "vue" => Some(SourceKind::Vue),
            "svelte" => Some(SourceKind::Svelte),
            _ => None,
        }
    }

    /// Single-file components always have an implicit default export
    pub fn is_single_file_component(self) -> bool {
        matches!(self, SourceKind::Vue | SourceKind::Svelte)
    }
}

/// Everything a module exports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSet {
    /// Module has a default export
    pub has_default: bool,
    /// Identifier behind the default export, when it has one
    pub default_name: Option<String>,
    /// Exported functions, constants, variables, enums
    pub values: BTreeSet<String>,
    /// Exported classes
    pub classes: BTreeSet<String>,
    /// Exported types and interfaces
    pub types: BTreeSet<String>,
    /// Specifiers of `export * from '...'`
    pub star_from: BTreeSet<String>,
}

impl ExportSet {
    /// Every exported name, `default` included
    pub fn names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .values
            .iter()
            .chain(&self.classes)
            .chain(&self.types)
            .cloned()
            .collect();
        if self.has_default {
            names.insert("default".to_string());
        }
        names
    }

    /// Nothing exported at all
    pub fn is_empty(&self) -> bool {
        !self.has_default
            && self.values.is_empty()
            && self.classes.is_empty()
            && self.types.is_empty()
            && self.star_from.is_empty()
    }

    /// PascalCase value or class exports
    pub fn pascal_case_names(&self) -> impl Iterator<Item = &String> {
        self.values
            .iter()
            .chain(&self.classes)
            .filter(|n| is_pascal_case(n))
    }
}

/// Whether an identifier looks like a component name
pub fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().any(|c| c.is_ascii_lowercase())
}

/// Extract the exports of a source file
///
/// Single-file components get their implicit default export. Svelte
/// instance-script `export let` props are not module exports and are
/// skipped; only `<script context="module">` blocks count.
pub fn extract_exports(content: &str, kind: SourceKind) -> ExportSet {
    match kind {
        SourceKind::Script | SourceKind::TypeScript => extract_from_script(content),
        SourceKind::Vue => {
            let mut set = ExportSet::default();
            for (attrs, body) in script_blocks(content) {
                if attrs.contains("setup") {
                    continue;
                }
                merge(&mut set, extract_from_script(body));
            }
            set.has_default = true;
            set
        }
        SourceKind::Svelte => {
            let mut set = ExportSet::default();
            for (attrs, body) in script_blocks(content) {
                if attrs.contains("context=\"module\"")
                    || attrs.contains("context='module'")
                    || attrs.split_whitespace().any(|a| a == "module")
                {
                    merge(&mut set, extract_from_script(body));
                }
            }
            set.has_default = true;
            set.default_name = None;
            set
        }
    }
}

fn merge(into: &mut ExportSet, from: ExportSet) {
    into.has_default |= from.has_default;
    if into.default_name.is_none() {
        into.default_name = from.default_name;
    }
    into.values.extend(from.values);
    into.classes.extend(from.classes);
    into.types.extend(from.types);
    into.star_from.extend(from.star_from);
}

/// `<script ...>` blocks of a single-file component as (attributes, body)
pub fn script_blocks(content: &str) -> Vec<(&str, &str)> {
    let re = SCRIPT_BLOCK_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(r"(?s)<script([^>]*)>(.*?)</script>").expect("script block regex is valid")
    });
    re.captures_iter(content)
        .filter_map(|cap| Some((cap.get(1)?.as_str(), cap.get(2)?.as_str())))
        .collect()
}

fn extract_from_script(content: &str) -> ExportSet {
    let mut set = ExportSet::default();

    let default_re = EXPORT_DEFAULT_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(
            r"(?m)^\s*export\s+default\s+(?:(?:async\s+)?function\s*\*?\s*|class\s+|abstract\s+class\s+)?([A-Za-z_$][\w$]*)?",
        )
        .expect("export default regex is valid")
    });
    for cap in default_re.captures_iter(content) {
        set.has_default = true;
        if let Some(name) = cap.get(1) {
            let name = name.as_str();
            if !is_keyword(name) && set.default_name.is_none() {
                set.default_name = Some(name.to_string());
            }
        }
    }

    let decl_re = EXPORT_DECL_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(
            r"(?m)^\s*export\s+(?:declare\s+)?(async\s+function\s*\*?|function\s*\*?|const\s+enum|enum|abstract\s+class|class|type|interface)\s+([A-Za-z_$][\w$]*)",
        )
        .expect("export declaration regex is valid")
    });
    for cap in decl_re.captures_iter(content) {
        let (Some(keyword), Some(name)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        let name = name.as_str().to_string();
        let keyword = keyword.as_str();
        if keyword.ends_with("class") {
            set.classes.insert(name);
        } else if keyword == "type" || keyword == "interface" {
            set.types.insert(name);
        } else {
            set.values.insert(name);
        }
    }

    let binding_re = EXPORT_BINDING_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(r"(?m)^\s*export\s+(?:declare\s+)?(?:const|let|var)\s+")
            .expect("export binding regex is valid")
    });
    for found in binding_re.find_iter(content) {
        let rest = &content[found.end()..];
        // `export const enum` is an enum declaration, handled above.
        if rest.starts_with("enum ") {
            continue;
        }
        for declarator in split_top_level(&rest[..statement_end(rest)], ',') {
            let binding = match split_top_level(declarator, '=').first() {
                Some(binding) => binding.trim(),
                None => continue,
            };
            binding_names(binding, &mut set.values);
        }
    }

    let list_re = EXPORT_LIST_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(r"(?m)^\s*export\s+(type\s+)?\{([^}]*)\}").expect("export list regex is valid")
    });
    for cap in list_re.captures_iter(content) {
        let type_only = cap.get(1).is_some();
        let Some(list) = cap.get(2) else { continue };
        for item in list.as_str().split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (item_is_type, item) = match item.strip_prefix("type ") {
                Some(rest) => (true, rest.trim()),
                None => (false, item),
            };
            let exported = match item.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => item,
            };
            if exported == "default" {
                set.has_default = true;
                if let Some((local, _)) = item.split_once(" as ") {
                    let local = local.trim();
                    if local != "default" && set.default_name.is_none() {
                        set.default_name = Some(local.to_string());
                    }
                }
            } else if type_only || item_is_type {
                set.types.insert(exported.to_string());
            } else {
                set.values.insert(exported.to_string());
            }
        }
    }

    let star_re = EXPORT_STAR_RE.get_or_init(|| {
        // SAFETY: This regex pattern is compile-time validated and will never fail.
        Regex::new(r#"(?m)^\s*export\s+\*\s*(?:as\s+([A-Za-z_$][\w$]*)\s+)?from\s+['"]([^'"]+)['"]"#)
            .expect("export star regex is valid")
    });
    for cap in star_re.captures_iter(content) {
        match (cap.get(1), cap.get(2)) {
            (Some(ns), _) => {
                set.values.insert(ns.as_str().to_string());
            }
            (None, Some(from)) => {
                set.star_from.insert(from.as_str().to_string());
            }
            _ => {}
        }
    }

    set
}

/// Byte offset where a `const`/`let`/`var` statement ends
///
/// A `;` at nesting depth zero ends it, and so does a line break at depth
/// zero unless the statement obviously continues on the next line.
fn statement_end(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => return i,
            b'\n' if depth == 0 => {
                let before = text[..i].trim_end();
                let after = text[i..].trim_start();
                let continues = before.ends_with(|c: char| ",=+-*/%&|^?:<>.!".contains(c))
                    || after.starts_with(|c: char| ",.?:=".contains(c));
                if !continues {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Split on `sep` where it is not nested in brackets or string literals
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            // `=>` and `==` are not assignments.
            '=' if sep == '=' && matches!(chars.peek(), Some((_, '>' | '='))) => {
                chars.next();
            }
            _ if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Names bound by a declarator target: an identifier or a destructuring
/// pattern, possibly followed by a type annotation
fn binding_names(binding: &str, out: &mut BTreeSet<String>) {
    let binding = binding.trim();
    let binding = binding.strip_prefix("...").unwrap_or(binding).trim_start();
    if let Some(inner) = bracketed(binding, '{', '}') {
        for property in split_top_level(inner, ',') {
            let property = split_top_level(property, '=')[0].trim();
            if property.is_empty() {
                continue;
            }
            match split_top_level(property, ':').as_slice() {
                [_, target, ..] => binding_names(target, out),
                _ => binding_names(property, out),
            }
        }
    } else if let Some(inner) = bracketed(binding, '[', ']') {
        for element in split_top_level(inner, ',') {
            let element = split_top_level(element, '=')[0].trim();
            if !element.is_empty() {
                binding_names(element, out);
            }
        }
    } else {
        let end = binding
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(binding.len());
        let (name, tail) = binding.split_at(end);
        let tail = tail.trim_start();
        let starts_identifier = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
        if starts_identifier && (tail.is_empty() || tail.starts_with(':') || tail.starts_with('!')) {
            out.insert(name.to_string());
        }
    }
}

/// Contents between `open` at the start of `text` and its matching `close`
fn bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let rest = text.strip_prefix(open)?;
    let mut depth = 1usize;
    for (i, c) in rest.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&rest[..i]);
            }
        }
    }
    None
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "function" | "class" | "async" | "new" | "await" | "typeof" | "void" | "null" | "true"
            | "false" | "undefined" | "this"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_default_function_export() {
        let set = extract_exports(
            "export default function Button(props) {\n  return <button/>;\n}\n",
            SourceKind::Script,
        );
        assert!(set.has_default);
        assert_eq!(set.default_name.as_deref(), Some("Button"));
        assert_eq!(set.names(), BTreeSet::from(["default".to_string()]));
    }

    #[test]
    fn test_extract_default_identifier_export() {
        let set = extract_exports("const Card = () => null;\nexport default Card;\n", SourceKind::Script);
        assert_eq!(set.default_name.as_deref(), Some("Card"));
    }

    #[test]
    fn test_extract_anonymous_default_export() {
        let set = extract_exports("export default () => null;\n", SourceKind::Script);
        assert!(set.has_default);
        assert_eq!(set.default_name, None);
    }

    #[test]
    fn test_extract_named_values_classes_and_types() {
        let src = r#"
export const Title = () => null;
export function useTitle() {}
export async function loadTitle() {}
export class TitleStore {}
export enum Size { Small, Large }
export type TitleProps = { text: string };
export interface TitleTheme { color: string }
"#;
        let set = extract_exports(src, SourceKind::TypeScript);
        assert_eq!(
            set.values,
            BTreeSet::from([
                "Title".to_string(),
                "useTitle".to_string(),
                "loadTitle".to_string(),
                "Size".to_string()
            ])
        );
        assert_eq!(set.classes, BTreeSet::from(["TitleStore".to_string()]));
        assert_eq!(
            set.types,
            BTreeSet::from(["TitleProps".to_string(), "TitleTheme".to_string()])
        );
        assert!(!set.has_default);
    }

    #[test]
    fn test_extract_every_declarator_of_one_statement() {
        let src = "export const SMALL = 1, LARGE = sizes(2, 3), HUGE = { a: 1, b: 2 };\nexport let first,\n  second = () => 1;\nconst local = 1, other = 2;\n";
        let set = extract_exports(src, SourceKind::Script);
        assert_eq!(
            set.values,
            BTreeSet::from([
                "SMALL".to_string(),
                "LARGE".to_string(),
                "HUGE".to_string(),
                "first".to_string(),
                "second".to_string()
            ])
        );
    }

    #[test]
    fn test_extract_destructured_exports() {
        let src = r#"
export const { primary, accent: highlight, nested: { depth = 2 }, ...others } = palette;
export const [head, , tail = 'x', ...rest] = list;
export const theme: Theme = { mode: 'dark', scale: [1, 2] }, ready = true;
export const enum Align { Left, Right }
"#;
        let set = extract_exports(src, SourceKind::TypeScript);
        let expected: BTreeSet<String> = [
            "primary", "highlight", "depth", "others", "head", "tail", "rest", "theme", "ready", "Align",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(set.values, expected);
    }

    #[test]
    fn test_extract_export_list_with_aliases_and_reexports() {
        let src = r#"
export { Button, Card as Panel } from './ui';
export { type Theme, Layout as default };
export type { Props } from './props';
export * from './icons';
export * as utils from './utils';
"#;
        let set = extract_exports(src, SourceKind::TypeScript);
        assert!(set.values.contains("Button"));
        assert!(set.values.contains("Panel"));
        assert!(set.values.contains("utils"));
        assert!(!set.values.contains("Card"));
        assert!(set.types.contains("Theme"));
        assert!(set.types.contains("Props"));
        assert!(set.has_default);
        assert_eq!(set.default_name.as_deref(), Some("Layout"));
        assert_eq!(set.star_from, BTreeSet::from(["./icons".to_string()]));
    }

    #[test]
    fn test_vue_file_has_implicit_default_export() {
        let src = r#"<template><div/></template>
<script>
export const sizes = ['sm', 'lg'];
export default { name: 'Badge' };
</script>
<script setup>
export const ignored = 1;
</script>
"#;
        let set = extract_exports(src, SourceKind::Vue);
        assert!(set.has_default);
        assert!(set.values.contains("sizes"));
        assert!(!set.values.contains("ignored"));
    }

    #[test]
    fn test_svelte_instance_props_are_not_exports() {
        let src = r#"<script context="module">
export const preload = () => null;
</script>
<script>
export let title;
</script>
<h1>{title}</h1>
"#;
        let set = extract_exports(src, SourceKind::Svelte);
        assert!(set.has_default);
        assert_eq!(set.values, BTreeSet::from(["preload".to_string()]));
    }

    #[test]
    fn test_is_pascal_case() {
        assert!(is_pascal_case("Button"));
        assert!(is_pascal_case("NavBar2"));
        assert!(!is_pascal_case("button"));
        assert!(!is_pascal_case("API"));
        assert!(!is_pascal_case(""));
    }

    #[test]
    fn test_source_kind_from_path() {
        assert_eq!(SourceKind::from_path(Path::new("a/B.tsx")), Some(SourceKind::TypeScript));
        assert_eq!(SourceKind::from_path(Path::new("a/B.vue")), Some(SourceKind::Vue));
        assert_eq!(SourceKind::from_path(Path::new("a/B.css")), None);
        assert!(SourceKind::Svelte.is_single_file_component());
    }
}
