//! Signature-preserving stubs
//!
//! A stub replaces a removed component file. It exports exactly the names
//! the original exported, so every import still resolves at compile time,
//! but renders nothing. The first line carries a marker naming the unit so
//! the tree and the classifier can tell stubs from originals.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classifier::exports::{extract_exports, ExportSet, SourceKind};

/// Marker on the first line of every stub
pub const STUB_MARKER: &str = "bundle-slim:stub";

const FALLBACK_IDENTIFIER: &str = "BundleSlimStub";

/// Stub generation failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StubError {
    /// The stub would not export a name the original exports
    #[error("stub for {path} would drop export '{name}'")]
    MissingExport {
        /// File being stubbed
        path: PathBuf,
        /// Export that would be lost
        name: String,
    },

    /// The stub would export a name the original does not
    #[error("stub for {path} would add export '{name}'")]
    ExtraExport {
        /// File being stubbed
        path: PathBuf,
        /// Unexpected export
        name: String,
    },

    /// No stub template for this file type
    #[error("cannot stub {path}: unsupported file type")]
    Unsupported {
        /// File being stubbed
        path: PathBuf,
    },
}

/// Name carried by a stub marker, if `content` is a stub
pub fn stub_marker_name(content: &str) -> Option<&str> {
    let first = content.lines().find(|l| !l.trim().is_empty())?;
    let (_, rest) = first.split_once(STUB_MARKER)?;
    rest.trim()
        .trim_end_matches("-->")
        .split_whitespace()
        .next()
}

/// Whether `content` is a stub written by bundle-slim
pub fn is_stub(content: &str) -> bool {
    stub_marker_name(content).is_some()
}

/// Generate the stub for one file of a unit
///
/// The result is checked against the original: the exported name sets
/// (and `export *` sources) must be identical.
///
/// # Examples
///
/// ```
/// use bundle_slim::engine::stub::{generate_stub, is_stub};
/// use std::path::Path;
///
/// let original = "export default function Card() { return <div/>; }\nexport const CARD_GAP = 4;\n";
/// let stub = generate_stub(Path::new("src/Card.jsx"), "Card", original)?;
/// assert!(is_stub(&stub));
/// assert!(stub.contains("CARD_GAP"));
/// # Ok::<(), bundle_slim::engine::stub::StubError>(())
/// ```
pub fn generate_stub(path: &Path, unit: &str, original: &str) -> Result<String, StubError> {
    let kind = SourceKind::from_path(path).ok_or_else(|| StubError::Unsupported {
        path: path.to_path_buf(),
    })?;
    let exports = extract_exports(original, kind);

    let stub = match kind {
        SourceKind::Script | SourceKind::TypeScript => script_stub(unit, &exports, kind),
        SourceKind::Vue => vue_stub(unit, &exports),
        SourceKind::Svelte => svelte_stub(unit, &exports),
    };

    verify(path, kind, &exports, &stub)?;
    Ok(stub)
}

fn verify(path: &Path, kind: SourceKind, original: &ExportSet, stub: &str) -> Result<(), StubError> {
    let produced = extract_exports(stub, kind);
    let (want, got) = (original.names(), produced.names());

    if let Some(name) = want.difference(&got).next() {
        return Err(StubError::MissingExport {
            path: path.to_path_buf(),
            name: name.clone(),
        });
    }
    if let Some(name) = got.difference(&want).next() {
        return Err(StubError::ExtraExport {
            path: path.to_path_buf(),
            name: name.clone(),
        });
    }
    if let Some(from) = original.star_from.difference(&produced.star_from).next() {
        return Err(StubError::MissingExport {
            path: path.to_path_buf(),
            name: format!("* from '{}'", from),
        });
    }
    Ok(())
}

fn identifier_for(unit: &str) -> &str {
    let valid = unit
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && unit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid {
        unit
    } else {
        FALLBACK_IDENTIFIER
    }
}

fn named_exports(exports: &ExportSet, out: &mut String, with_types: bool) {
    for value in &exports.values {
        let _ = writeln!(out, "export function {}() {{ return null; }}", value);
    }
    for class in &exports.classes {
        let _ = writeln!(out, "export class {} {{}}", class);
    }
    if with_types {
        for ty in &exports.types {
            let _ = writeln!(out, "export type {} = any;", ty);
        }
    }
    for from in &exports.star_from {
        let _ = writeln!(out, "export * from '{}';", from);
    }
}

fn script_stub(unit: &str, exports: &ExportSet, kind: SourceKind) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {} {}", STUB_MARKER, unit);
    out.push_str("/* eslint-disable */\n");
    if kind == SourceKind::TypeScript {
        out.push_str("// @ts-nocheck\n");
    }

    named_exports(exports, &mut out, kind == SourceKind::TypeScript);

    if exports.has_default {
        let default_name = exports
            .default_name
            .as_deref()
            .filter(|n| exports.values.contains(*n) || exports.classes.contains(*n));
        match default_name {
            // Already declared by a named export above.
            Some(name) => {
                let _ = writeln!(out, "export default {};", name);
            }
            None => {
                let ident = exports
                    .default_name
                    .as_deref()
                    .filter(|n| !exports.types.contains(*n))
                    .unwrap_or_else(|| identifier_for(unit));
                if exports.names().contains(ident) {
                    out.push_str("export default function () { return null; }\n");
                } else {
                    let _ = writeln!(out, "export default function {}() {{ return null; }}", ident);
                }
            }
        }
    }
    out
}

fn vue_stub(unit: &str, exports: &ExportSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!-- {} {} -->", STUB_MARKER, unit);
    out.push_str("<template>\n  <div style=\"display: none\"></div>\n</template>\n<script>\n");
    named_exports(exports, &mut out, false);
    let _ = writeln!(out, "export default {{ name: '{}' }};", identifier_for(unit));
    out.push_str("</script>\n");
    out
}

fn svelte_stub(unit: &str, exports: &ExportSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!-- {} {} -->", STUB_MARKER, unit);
    let mut named = String::new();
    named_exports(exports, &mut named, false);
    if !named.is_empty() {
        out.push_str("<script context=\"module\">\n");
        out.push_str(&named);
        out.push_str("</script>\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(content: &str, path: &str) -> std::collections::BTreeSet<String> {
        let kind = SourceKind::from_path(Path::new(path)).unwrap();
        extract_exports(content, kind).names()
    }

    #[test]
    fn test_stub_preserves_every_export_kind() {
        let original = r#"
import { helper } from './helper';
export default function Chart() { return <svg/>; }
export const CHART_COLORS = ['red'];
export function useChart() {}
export class ChartModel {}
export type ChartProps = { data: number[] };
export interface ChartTheme { color: string }
export { helper as chartHelper };
export * from './axes';
"#;
        let stub = generate_stub(Path::new("src/Chart.tsx"), "Chart", original).unwrap();
        assert_eq!(names(&stub, "a.tsx"), names(original, "a.tsx"));
        assert!(stub.contains("export * from './axes';"));
        assert!(stub.starts_with("// bundle-slim:stub Chart\n"));
        assert!(!stub.contains("svg"));
    }

    #[test]
    fn test_stub_default_referencing_named_export() {
        let original = "export function Card() { return null; }\nexport default Card;\n";
        let stub = generate_stub(Path::new("src/Card.js"), "Card", original).unwrap();
        assert!(stub.contains("export function Card()"));
        assert!(stub.contains("export default Card;"));
        assert!(!stub.contains("export default function"));
    }

    #[test]
    fn test_stub_keeps_every_declarator_of_a_multi_binding_export() {
        let original = "export default function Card() { return <div/>; }\nexport const SMALL = 1, LARGE = 2;\n";
        let stub = generate_stub(Path::new("src/Card.js"), "Card", original).unwrap();
        assert!(stub.contains("export function SMALL()"));
        assert!(stub.contains("export function LARGE()"));
        assert_eq!(names(&stub, "a.js"), names(original, "a.js"));
    }

    #[test]
    fn test_stub_keeps_destructured_exports() {
        let original = r#"
export default function Card() { return <div/>; }
export const { gap, radius: cornerRadius } = tokens;
export const [primary, secondary] = palette;
"#;
        let stub = generate_stub(Path::new("src/Card.jsx"), "Card", original).unwrap();
        for name in ["gap", "cornerRadius", "primary", "secondary"] {
            assert!(stub.contains(&format!("export function {}()", name)), "missing {}", name);
        }
        assert!(!stub.contains("radius()"));
    }

    #[test]
    fn test_stub_for_vue_component() {
        let original = "<template><p>hi</p></template>\n<script>\nexport const sizes = [];\nexport default {}\n</script>\n";
        let stub = generate_stub(Path::new("src/Hello.vue"), "Hello", original).unwrap();
        assert_eq!(names(&stub, "a.vue"), names(original, "a.vue"));
        assert_eq!(stub_marker_name(&stub), Some("Hello"));
    }

    #[test]
    fn test_stub_for_svelte_component_without_module_script() {
        let stub = generate_stub(Path::new("src/Nav.svelte"), "Nav", "<nav>x</nav>\n").unwrap();
        assert_eq!(stub.lines().count(), 1);
        assert!(is_stub(&stub));
    }

    #[test]
    fn test_stub_rejects_types_in_plain_script() {
        let original = "export default function A() {}\nexport type Props = {};\n";
        let err = generate_stub(Path::new("src/A.js"), "A", original).unwrap_err();
        assert_eq!(
            err,
            StubError::MissingExport {
                path: PathBuf::from("src/A.js"),
                name: "Props".to_string()
            }
        );
    }

    #[test]
    fn test_stub_rejects_unknown_extension() {
        let err = generate_stub(Path::new("src/a.css"), "A", ".a{}").unwrap_err();
        assert!(matches!(err, StubError::Unsupported { .. }));
    }

    #[test]
    fn test_stub_marker_name_ignores_regular_files() {
        assert_eq!(stub_marker_name("// just a comment\n"), None);
        assert_eq!(stub_marker_name("\n// bundle-slim:stub Foo\n"), Some("Foo"));
        assert!(!is_stub(""));
    }

    proptest! {
        #[test]
        fn prop_stub_exports_match_original(
            values in proptest::collection::btree_set("[a-z][a-zA-Z0-9]{0,8}", 0..5),
            types in proptest::collection::btree_set("T[A-Z][a-z]{0,6}", 0..3),
            has_default in any::<bool>(),
        ) {
            let mut original = String::new();
            for v in &values {
                original.push_str(&format!("export const {} = 1;\n", v));
            }
            for t in &types {
                original.push_str(&format!("export type {} = string;\n", t));
            }
            if has_default {
                original.push_str("export default function Widget() { return null; }\n");
            }
            let stub = generate_stub(Path::new("src/Widget.ts"), "Widget", &original).unwrap();
            prop_assert_eq!(names(&stub, "a.ts"), names(&original, "a.ts"));
        }
    }
}
