//! Test fixture creation utilities

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Where fixture components live, relative to the project root
pub const COMPONENT_DIR: &str = "src/components";

pub const PACKAGE_JSON: &str = r#"{
  "name": "fixture-app",
  "dependencies": { "react": "^18.2.0", "chart.js": "^4.4.0" },
  "devDependencies": { "vite": "^5.0.0" }
}
"#;

/// Path of a fixture component file
pub fn component_path(root: &Path, name: &str) -> PathBuf {
    root.join(COMPONENT_DIR).join(format!("{}.jsx", name))
}

/// Source of an unreferenced component
pub fn component_source(name: &str) -> String {
    format!(
        "import React from 'react';\n\nexport default function {name}() {{\n  return (\n    <section className=\"{name}\">\n      <h2>{name}</h2>\n      <p>Lorem ipsum dolor sit amet, consectetur adipiscing elit.</p>\n    </section>\n  );\n}}\n"
    )
}

/// Project with an entry `App` that renders `rendered`, plus one file per
/// name in `components`
pub fn create_project(components: &[&str], rendered: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = dir.path();
    fs::create_dir_all(root.join(COMPONENT_DIR)).expect("Failed to create component dir");
    fs::write(root.join("package.json"), PACKAGE_JSON).expect("Failed to write package.json");

    let imports: String = rendered
        .iter()
        .map(|name| format!("import {name} from './components/{name}';\n"))
        .collect();
    let body: String = rendered.iter().map(|name| format!("<{name} />")).collect();
    fs::write(
        root.join("src/App.jsx"),
        format!(
            "import React from 'react';\n{imports}\nexport default function App() {{\n  return <main>{body}</main>;\n}}\n"
        ),
    )
    .expect("Failed to write App.jsx");

    for name in components.iter().chain(rendered) {
        fs::write(component_path(root, name), component_source(name)).expect("Failed to write component");
    }
    dir
}

/// Write `.bundle-slim.toml`
pub fn write_config(root: &Path, toml: &str) {
    fs::write(root.join(".bundle-slim.toml"), toml).expect("Failed to write config");
}
